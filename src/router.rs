//! Router spawns and wires the source, pipeline and live timing tasks

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::bus::{EventQueueSender, PersistenceBus, PersistenceReceiver, RealtimeBus, RealtimeReceiver, event_queue};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::pipeline::{BusSink, Pipeline, PipelineStats, PitStatusEnricher, SectorTimingEnricher, SpeedTrapEnricher};
use crate::provider::TrackConfigProvider;
use crate::session::LiveTiming;
use crate::source::{EventSource, translate};
use crate::sources::ServerControl;

/// Everything the caller needs from a running router.
pub struct RouterChannels {
    /// Live timing state, updated by the consumer task
    pub live_timing: Arc<LiveTiming>,
    /// Lossless feed for a durable writer
    pub persistence: PersistenceReceiver,
    /// Template for additional realtime subscribers
    pub realtime: RealtimeReceiver,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Ends with the source's receive error, if it failed
    pub source_task: JoinHandle<Result<()>>,
    pub pipeline_task: JoinHandle<PipelineStats>,
    pub live_timing_task: JoinHandle<()>,
}

/// Router spawns and manages the processing tasks
///
/// Three tasks connected by bounded queues:
/// - the source task owns the [`EventSource`] and fills the event queue
/// - the pipeline task runs the enrichers and publishes to both buses
/// - the live timing task folds the realtime bus into [`LiveTiming`]
///
/// Dropping the source's queue sender completes every downstream stage in
/// turn, so a finite source drains through the whole graph on its own. A
/// receive error ends the source task the same way and is returned from it;
/// restarting is left to the hosting process.
pub struct Router;

impl Router {
    /// Spawn the tasks for the given source.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<S>(
        source: S,
        tracks: Arc<dyn TrackConfigProvider>,
        control: Option<ServerControl>,
        config: &ServerConfig,
    ) -> RouterChannels
    where
        S: EventSource,
    {
        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = event_queue(config.event_queue_capacity);
        let (realtime, realtime_rx) = RealtimeBus::new(config.realtime_bus_capacity);
        let (persistence, persistence_rx) = PersistenceBus::new(config.persistence_bus_capacity);
        let realtime_template = realtime.subscribe();

        let live_timing = Arc::new(LiveTiming::new(control));

        let live_timing_task =
            tokio::spawn(Arc::clone(&live_timing).run(realtime_rx, cancel.clone()));

        let pipeline = Pipeline::new(BusSink::new(realtime, persistence, cancel.clone()))
            .with_enricher(SectorTimingEnricher::new())
            .with_enricher(PitStatusEnricher::new(Arc::clone(&tracks)))
            .with_enricher(SpeedTrapEnricher::new(tracks));
        let pipeline_task = tokio::spawn(pipeline.run(queue_rx, cancel.clone()));

        let source_task = tokio::spawn(Self::source_task(source, queue_tx, cancel.clone()));

        RouterChannels {
            live_timing,
            persistence: persistence_rx,
            realtime: realtime_template,
            cancel,
            source_task,
            pipeline_task,
            live_timing_task,
        }
    }

    /// Source task - pulls packets and queues their events
    async fn source_task<S>(mut source: S, queue: EventQueueSender, cancel: CancellationToken) -> Result<()>
    where
        S: EventSource,
    {
        let name = source.name();
        info!(source = name, "Source task started");
        let mut packets = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = name, "Source cancelled");
                    break;
                }
                result = source.next_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    packets += 1;
                    let Some(event) = translate(packet) else {
                        continue;
                    };
                    trace!(kind = %event.kind(), car_id = ?event.car_id(), "Queueing event");
                    if !queue.push(event) {
                        debug!(source = name, "Pipeline gone, stopping source");
                        break;
                    }
                }
                Ok(None) => {
                    info!(source = name, packets, "Source ended");
                    break;
                }
                Err(e) => {
                    error!(source = name, error = %e, packets, "Receive loop failed, stopping source");
                    return Err(e);
                }
            }
        }

        info!(source = name, packets, "Source task ended");
        Ok(())
    }
}
