//! Bounded queues between the stages.
//!
//! - The event queue (source to pipeline) and the [`RealtimeBus`] drop the
//!   oldest entry when full. The receiver logs how many events it lost and
//!   keeps going.
//! - The [`PersistenceBus`] never drops: a full bus makes `publish` wait,
//!   which back-pressures the pipeline.
//!
//! Every queue completes when its sending side is dropped.

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::types::SimEvent;
use crate::{Result, TimingError};

/// Receiving end of a drop-oldest queue.
#[derive(Debug)]
pub struct LossyReceiver {
    rx: broadcast::Receiver<SimEvent>,
    channel: &'static str,
    lost: u64,
}

impl LossyReceiver {
    fn new(rx: broadcast::Receiver<SimEvent>, channel: &'static str) -> Self {
        Self { rx, channel, lost: 0 }
    }

    /// Wait for the next event. Returns `None` once the queue is complete.
    pub async fn recv(&mut self) -> Option<SimEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => self.record_lag(n),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<SimEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(_) => return None,
            }
        }
    }

    /// A second receiver on the same queue, starting at the next event.
    pub fn resubscribe(&self) -> Self {
        Self::new(self.rx.resubscribe(), self.channel)
    }

    /// Events this receiver lost to overflow so far.
    pub fn lost(&self) -> u64 {
        self.lost
    }

    fn record_lag(&mut self, n: u64) {
        self.lost += n;
        warn!(channel = self.channel, dropped = n, total_dropped = self.lost, "Queue overflow, oldest events dropped");
    }

    /// Stream of events. Overflow is logged and skipped.
    pub fn into_stream(self) -> impl Stream<Item = SimEvent> + Send + 'static {
        let channel = self.channel;
        BroadcastStream::new(self.rx).filter_map(move |item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!(channel, dropped = n, "Queue overflow, oldest events dropped");
                    None
                }
            }
        })
    }
}

/// Sending end of the event queue. Pushing never blocks.
#[derive(Debug, Clone)]
pub struct EventQueueSender {
    tx: broadcast::Sender<SimEvent>,
}

impl EventQueueSender {
    /// Queue an event, overwriting the oldest one when full. Returns `false`
    /// when the pipeline is gone.
    pub fn push(&self, event: SimEvent) -> bool {
        match self.tx.send(event) {
            Ok(_) => true,
            Err(_) => {
                trace!("Event queue has no receiver");
                false
            }
        }
    }
}

/// Receiving end of the event queue.
pub type EventQueueReceiver = LossyReceiver;

/// Create the source-to-pipeline queue.
pub fn event_queue(capacity: usize) -> (EventQueueSender, EventQueueReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (EventQueueSender { tx }, LossyReceiver::new(rx, "events"))
}

/// Lossy fan-out for live consumers.
#[derive(Debug, Clone)]
pub struct RealtimeBus {
    tx: broadcast::Sender<SimEvent>,
}

/// Subscriber on the [`RealtimeBus`].
pub type RealtimeReceiver = LossyReceiver;

impl RealtimeBus {
    pub fn new(capacity: usize) -> (Self, RealtimeReceiver) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, LossyReceiver::new(rx, "realtime"))
    }

    /// Publish to every current subscriber. Never blocks; publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: SimEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> RealtimeReceiver {
        LossyReceiver::new(self.tx.subscribe(), "realtime")
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Lossless queue for the durable writer.
#[derive(Debug, Clone)]
pub struct PersistenceBus {
    tx: mpsc::Sender<SimEvent>,
}

impl PersistenceBus {
    pub fn new(capacity: usize) -> (Self, PersistenceReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, PersistenceReceiver { rx })
    }

    /// Publish, waiting for free capacity when the bus is full.
    ///
    /// Fails with [`TimingError::Cancelled`] if `cancel` fires while waiting
    /// and with [`TimingError::ChannelClosed`] once the receiver is gone.
    pub async fn publish(&self, event: SimEvent, cancel: &CancellationToken) -> Result<()> {
        let event = match self.tx.try_send(event) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(TimingError::channel_closed("persistence"));
            }
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };

        trace!("Persistence bus full, waiting for capacity");
        tokio::select! {
            _ = cancel.cancelled() => Err(TimingError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| TimingError::channel_closed("persistence")),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of the [`PersistenceBus`].
#[derive(Debug)]
pub struct PersistenceReceiver {
    rx: mpsc::Receiver<SimEvent>,
}

impl PersistenceReceiver {
    /// Next event in publish order; `None` once the pipeline has stopped and
    /// the bus is drained.
    pub async fn recv(&mut self) -> Option<SimEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SimEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<SimEvent> {
        ReceiverStream::new(self.rx)
    }
}
