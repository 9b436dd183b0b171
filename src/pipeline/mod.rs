//! Two-phase enrichment pipeline.
//!
//! For every inbound event the [`Pipeline`] runs the pre-phase enrichers in
//! registration order, publishing each derived event to the sink as soon as
//! the enricher returns it. Then the original event is published, then the
//! post-phase enrichers run the same way.
//!
//! Failures are isolated per enricher invocation:
//! - an enricher that errors or panics is logged and skipped
//! - a sink failure abandons only the rest of that invocation's output
//! - a sink failure for the original event is logged
//!
//! Events are processed strictly one at a time, so trackers never observe
//! events out of order.

mod enrichers;
mod sink;

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::Result;
use crate::bus::EventQueueReceiver;
use crate::types::SimEvent;

pub use enrichers::{PitStatusEnricher, SectorTimingEnricher, SpeedTrapEnricher};
pub use sink::BusSink;

/// When an enricher runs relative to the publish of the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

/// A stage that observes each event and may derive new ones.
#[async_trait::async_trait]
pub trait Enricher: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    /// Observe one event and return zero or more derived events.
    async fn enrich(&mut self, event: &SimEvent) -> Result<Vec<SimEvent>>;
}

/// Destination for every event leaving the pipeline.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &SimEvent) -> Result<()>;
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub derived: u64,
    pub enricher_failures: u64,
    pub sink_failures: u64,
}

/// Ordered enrichers in front of a single sink.
pub struct Pipeline<S> {
    pre: Vec<Box<dyn Enricher>>,
    post: Vec<Box<dyn Enricher>>,
    sink: S,
    stats: PipelineStats,
}

impl<S: EventSink> Pipeline<S> {
    pub fn new(sink: S) -> Self {
        Self { pre: Vec::new(), post: Vec::new(), sink, stats: PipelineStats::default() }
    }

    /// Register an enricher in its phase, after the ones already registered.
    pub fn with_enricher(mut self, enricher: impl Enricher + 'static) -> Self {
        self.add_enricher(Box::new(enricher));
        self
    }

    pub fn add_enricher(&mut self, enricher: Box<dyn Enricher>) {
        debug!(enricher = enricher.name(), phase = ?enricher.phase(), "Enricher registered");
        match enricher.phase() {
            Phase::Pre => self.pre.push(enricher),
            Phase::Post => self.post.push(enricher),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Route one event through both phases.
    pub async fn process(&mut self, event: SimEvent) {
        trace!(kind = %event.kind(), car_id = ?event.car_id(), "Routing event");
        self.stats.processed += 1;

        for enricher in self.pre.iter_mut() {
            invoke(enricher.as_mut(), &event, &self.sink, &mut self.stats).await;
        }

        if let Err(e) = self.sink.publish(&event).await {
            self.stats.sink_failures += 1;
            error!(kind = %event.kind(), error = %e, "Failed to publish event");
        }

        for enricher in self.post.iter_mut() {
            invoke(enricher.as_mut(), &event, &self.sink, &mut self.stats).await;
        }
    }

    /// Consume the queue until it completes or `cancel` fires.
    ///
    /// Events already queued at cancellation are drained before returning.
    /// The sink is dropped on return, completing the downstream buses.
    pub async fn run(mut self, mut queue: EventQueueReceiver, cancel: CancellationToken) -> PipelineStats {
        info!(pre = self.pre.len(), post = self.post.len(), "Pipeline started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                event = queue.recv() => Some(event),
            };
            match next {
                Some(Some(event)) => self.process(event).await,
                Some(None) => {
                    debug!("Event queue completed");
                    break;
                }
                None => {
                    debug!("Pipeline cancelled, draining queued events");
                    while let Some(event) = queue.try_recv() {
                        self.process(event).await;
                    }
                    break;
                }
            }
        }

        info!(
            processed = self.stats.processed,
            derived = self.stats.derived,
            enricher_failures = self.stats.enricher_failures,
            sink_failures = self.stats.sink_failures,
            lost = queue.lost(),
            "Pipeline stopped"
        );
        self.stats
    }
}

async fn invoke<S: EventSink>(
    enricher: &mut dyn Enricher,
    event: &SimEvent,
    sink: &S,
    stats: &mut PipelineStats,
) {
    let name = enricher.name();
    let derived = match AssertUnwindSafe(enricher.enrich(event)).catch_unwind().await {
        Ok(Ok(derived)) => derived,
        Ok(Err(e)) => {
            stats.enricher_failures += 1;
            error!(enricher = name, kind = %event.kind(), error = %e, "Enricher failed");
            return;
        }
        Err(panic) => {
            stats.enricher_failures += 1;
            error!(enricher = name, kind = %event.kind(), panic = panic_message(&*panic), "Enricher panicked");
            return;
        }
    };

    for derived_event in derived {
        if let Err(e) = sink.publish(&derived_event).await {
            stats.sink_failures += 1;
            error!(
                enricher = name,
                kind = %derived_event.kind(),
                error = %e,
                "Failed to publish derived event, dropping the rest of this output"
            );
            return;
        }
        stats.derived += 1;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
