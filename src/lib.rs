//! Live timing core for Assetto Corsa dedicated server telemetry.
//!
//! Paddock listens on the server's UDP plugin port, decodes the binary
//! protocol into domain events, derives sector splits, pit lane transitions
//! and speed trap readings, and folds everything into a queryable live
//! timing session.
//!
//! # Architecture
//!
//! ```text
//! UDP socket ─▶ EventSource ─▶ event queue ─▶ Pipeline ─┬─▶ RealtimeBus ─▶ LiveTiming
//!                (decode)      (drop-oldest)  (enrichers) └─▶ PersistenceBus ─▶ your writer
//! ```
//!
//! - **Event queue** and **realtime bus** drop the oldest entry when full
//! - **Persistence bus** never drops; a slow writer slows the pipeline
//! - One [`CancellationToken`](tokio_util::sync::CancellationToken) stops
//!   every task
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use paddock::{Paddock, ServerConfig};
//! use paddock::provider::StaticTrackConfigs;
//!
//! #[tokio::main]
//! async fn main() -> paddock::Result<()> {
//!     let config = ServerConfig::load("paddock.yaml")?;
//!     let tracks = StaticTrackConfigs::load("tracks.yaml")?;
//!     let mut handle = Paddock::start(&config, Arc::new(tracks)).await?;
//!
//!     // Durable writers drain this; dropping it disables persistence
//!     drop(handle.take_persistence());
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     for driver in handle.live_timing().leaderboard() {
//!         println!("{:>2} {:<20} {:?}", driver.position.unwrap_or(0), driver.driver_name, driver.best_lap_time_ms);
//!     }
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod config;
pub mod protocol;

// Sources and processing
pub mod bus;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod source;
pub mod sources;
pub mod stream;
pub mod tracking;

// Live state
pub mod session;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// Core exports
pub use config::ServerConfig;
pub use error::*;
pub use types::*;

pub use bus::{PersistenceReceiver, RealtimeReceiver};
pub use pipeline::PipelineStats;
pub use provider::TrackConfigProvider;
pub use router::{Router, RouterChannels};
pub use session::{LiveDriver, LiveTiming, LiveTimingSession, LiveTimingSnapshot};
pub use source::EventSource;
pub use sources::{ReplaySource, ServerControl, UdpEventSource};

/// Unified entry point for live timing.
///
/// # Examples
///
/// ## Live server
/// ```rust,no_run
/// use std::sync::Arc;
/// use paddock::{Paddock, ServerConfig};
/// use paddock::provider::NoTrackConfig;
///
/// #[tokio::main]
/// async fn main() -> paddock::Result<()> {
///     let handle = Paddock::start(&ServerConfig::default(), Arc::new(NoTrackConfig)).await?;
///     // Use handle...
///     handle.shutdown().await?;
///     Ok(())
/// }
/// ```
///
/// ## Recorded datagrams
/// ```rust,no_run
/// use std::sync::Arc;
/// use paddock::{Paddock, ServerConfig};
/// use paddock::provider::NoTrackConfig;
///
/// # #[tokio::main]
/// # async fn main() -> paddock::Result<()> {
/// let datagrams: Vec<Vec<u8>> = Vec::new();
/// let handle = Paddock::replay(datagrams, Arc::new(NoTrackConfig), &ServerConfig::default());
/// let stats = handle.wait().await?;
/// println!("{} events", stats.processed);
/// # Ok(())
/// # }
/// ```
pub struct Paddock;

impl Paddock {
    /// Bind the UDP plugin port and start processing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The listen port cannot be bound
    /// - The configured server endpoint does not resolve
    pub async fn start(config: &ServerConfig, tracks: Arc<dyn TrackConfigProvider>) -> Result<PaddockHandle> {
        let source = UdpEventSource::bind(config).await?;
        let control = source.control();
        Ok(Self::spawn(source, tracks, Some(control), config))
    }

    /// Process recorded datagrams, as fast as the pipeline takes them.
    ///
    /// Must be called inside a tokio runtime.
    pub fn replay(
        datagrams: impl IntoIterator<Item = Vec<u8>>,
        tracks: Arc<dyn TrackConfigProvider>,
        config: &ServerConfig,
    ) -> PaddockHandle {
        Self::spawn(ReplaySource::new(datagrams), tracks, None, config)
    }

    /// Process any event source.
    pub fn run<S: EventSource>(source: S, tracks: Arc<dyn TrackConfigProvider>, config: &ServerConfig) -> PaddockHandle {
        Self::spawn(source, tracks, None, config)
    }

    fn spawn<S: EventSource>(
        source: S,
        tracks: Arc<dyn TrackConfigProvider>,
        control: Option<ServerControl>,
        config: &ServerConfig,
    ) -> PaddockHandle {
        let channels = Router::spawn(source, tracks, control.clone(), config);
        info!(
            event_queue = config.event_queue_capacity,
            realtime = config.realtime_bus_capacity,
            persistence = config.persistence_bus_capacity,
            "Paddock started"
        );
        PaddockHandle {
            live_timing: channels.live_timing,
            persistence: Some(channels.persistence),
            realtime: channels.realtime,
            control,
            cancel: channels.cancel,
            tasks: Some(Tasks {
                source: channels.source_task,
                pipeline: channels.pipeline_task,
                live_timing: channels.live_timing_task,
            }),
        }
    }
}

struct Tasks {
    source: tokio::task::JoinHandle<Result<()>>,
    pipeline: tokio::task::JoinHandle<PipelineStats>,
    live_timing: tokio::task::JoinHandle<()>,
}

/// Handle to a running paddock. Dropping it cancels every task.
///
/// The handle keeps the persistence receiver until [`take_persistence`]
/// is called. The persistence bus never drops events, so a receiver that is
/// kept but never drained eventually stalls the pipeline; take it and drop
/// it when no durable writer is attached. [`wait`] and [`shutdown`] drop a
/// receiver that was never taken before waiting on the tasks.
///
/// [`take_persistence`]: PaddockHandle::take_persistence
/// [`wait`]: PaddockHandle::wait
/// [`shutdown`]: PaddockHandle::shutdown
pub struct PaddockHandle {
    live_timing: Arc<LiveTiming>,
    persistence: Option<PersistenceReceiver>,
    realtime: RealtimeReceiver,
    control: Option<ServerControl>,
    cancel: CancellationToken,
    tasks: Option<Tasks>,
}

impl PaddockHandle {
    pub fn live_timing(&self) -> Arc<LiveTiming> {
        Arc::clone(&self.live_timing)
    }

    /// The lossless event feed. Returns `None` after the first call.
    pub fn take_persistence(&mut self) -> Option<PersistenceReceiver> {
        self.persistence.take()
    }

    /// A new realtime subscriber, starting at the next published event.
    pub fn subscribe_realtime(&self) -> RealtimeReceiver {
        self.realtime.resubscribe()
    }

    /// Server control for live sources; `None` for replays.
    pub fn control(&self) -> Option<ServerControl> {
        self.control.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for every task to finish on its own, e.g. the end of a replay.
    ///
    /// # Errors
    ///
    /// Returns the source's receive error if the receive loop failed, or
    /// [`TimingError::TaskFailed`] if a task panicked. Every task has
    /// finished either way.
    pub async fn wait(mut self) -> Result<PipelineStats> {
        // An untaken receiver has no reader and would stall the pipeline
        if self.persistence.take().is_some() {
            debug!("Dropping undrained persistence receiver");
        }
        let Some(tasks) = self.tasks.take() else {
            return Ok(PipelineStats::default());
        };

        let source = tasks
            .source
            .await
            .unwrap_or_else(|e| Err(TimingError::task_failed("source", e.to_string())));
        let pipeline = tasks.pipeline.await.map_err(|e| {
            error!(error = %e, "Pipeline task failed");
            TimingError::task_failed("pipeline", e.to_string())
        });
        if let Err(e) = tasks.live_timing.await {
            error!(error = %e, "Live timing task failed");
        }

        source?;
        pipeline
    }

    /// Cancel every task and wait for them to stop.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](PaddockHandle::wait).
    pub async fn shutdown(self) -> Result<PipelineStats> {
        info!("Paddock shutting down");
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for PaddockHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
