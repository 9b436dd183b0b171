//! Sink that fans every event out to the realtime and persistence buses

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::EventSink;
use crate::bus::{PersistenceBus, RealtimeBus};
use crate::types::SimEvent;
use crate::{Result, TimingError};

/// Publishes to the lossy realtime bus, then to the lossless persistence bus.
///
/// A full persistence bus makes `publish` wait; `cancel` aborts that wait.
/// Once the persistence receiver is dropped the sink logs it once and keeps
/// serving the realtime bus.
#[derive(Debug)]
pub struct BusSink {
    realtime: RealtimeBus,
    persistence: PersistenceBus,
    cancel: CancellationToken,
    persistence_gone: AtomicBool,
}

impl BusSink {
    pub fn new(realtime: RealtimeBus, persistence: PersistenceBus, cancel: CancellationToken) -> Self {
        Self { realtime, persistence, cancel, persistence_gone: AtomicBool::new(false) }
    }
}

#[async_trait::async_trait]
impl EventSink for BusSink {
    async fn publish(&self, event: &SimEvent) -> Result<()> {
        let subscribers = self.realtime.publish(event.clone());
        trace!(kind = %event.kind(), subscribers, "Published to realtime bus");

        if self.persistence_gone.load(Ordering::Relaxed) {
            return Ok(());
        }
        match self.persistence.publish(event.clone(), &self.cancel).await {
            Err(TimingError::ChannelClosed { .. }) => {
                if !self.persistence_gone.swap(true, Ordering::Relaxed) {
                    warn!("Persistence receiver dropped, events are no longer persisted");
                }
                Ok(())
            }
            other => other,
        }
    }
}
