//! Owner of the current session and consumer of the realtime bus

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BestLapTelemetry, FeedEvent, LiveDriver, LiveTimingSession};
use crate::bus::RealtimeReceiver;
use crate::sources::ServerControl;
use crate::stream::ThrottleExt;
use crate::types::{CarId, SessionInfoReceived, SimEvent};

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveTimingSnapshot {
    pub session_id: Uuid,
    pub info: SessionInfoReceived,
    pub leaderboard: Vec<LiveDriver>,
    pub feed_len: usize,
}

/// Live timing state fed from the realtime bus.
///
/// Every `SessionInfoReceived` starts a fresh [`LiveTimingSession`] and
/// `SessionEnded` drops it. Queries return `None` or empty results while no
/// session is running.
#[derive(Debug)]
pub struct LiveTiming {
    current: RwLock<Option<Arc<LiveTimingSession>>>,
    version: watch::Sender<u64>,
    control: Option<ServerControl>,
    requested_cars: Mutex<HashSet<CarId>>,
    session_requested: Mutex<bool>,
}

impl Default for LiveTiming {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LiveTiming {
    /// `control` is used to ask the server for missing session or car info.
    pub fn new(control: Option<ServerControl>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            current: RwLock::new(None),
            version,
            control,
            requested_cars: Mutex::new(HashSet::new()),
            session_requested: Mutex::new(false),
        }
    }

    /// Apply one event to the current session.
    pub fn apply(&self, event: &SimEvent) {
        match event {
            SimEvent::SessionInfoReceived(info) => {
                let session = Arc::new(LiveTimingSession::new(info.clone()));
                info!(
                    session_id = %session.id(),
                    track = %info.track_name,
                    session_type = ?info.session_type,
                    "Live timing session started"
                );
                *self.current.write() = Some(session);
                self.requested_cars.lock().clear();
                *self.session_requested.lock() = false;
            }
            SimEvent::SessionEnded(_) => {
                if let Some(session) = self.current.write().take() {
                    info!(session_id = %session.id(), "Live timing session ended");
                }
            }
            _ => {
                let Some(session) = self.current_session() else {
                    return;
                };
                session.apply(event);
            }
        }
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn current_session(&self) -> Option<Arc<LiveTimingSession>> {
        self.current.read().clone()
    }

    pub fn driver(&self, car_id: CarId) -> Option<LiveDriver> {
        self.current_session()?.driver(car_id)
    }

    pub fn leaderboard(&self) -> Vec<LiveDriver> {
        self.current_session().map(|s| s.leaderboard()).unwrap_or_default()
    }

    pub fn feed_events(&self) -> Vec<FeedEvent> {
        self.current_session().map(|s| s.feed_events()).unwrap_or_default()
    }

    pub fn best_laps(&self) -> Vec<BestLapTelemetry> {
        self.current_session().map(|s| s.best_laps()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<LiveTimingSnapshot> {
        let session = self.current_session()?;
        Some(LiveTimingSnapshot {
            session_id: session.id(),
            info: session.info().clone(),
            leaderboard: session.leaderboard(),
            feed_len: session.feed_len(),
        })
    }

    /// Snapshots after every change, at most one per `interval`.
    ///
    /// Changes inside one interval collapse into the latest snapshot. The
    /// stream yields `None` while no session is running.
    pub fn snapshots(self: &Arc<Self>, interval: Duration) -> impl Stream<Item = Option<LiveTimingSnapshot>> + Send + 'static {
        let this = Arc::clone(self);
        WatchStream::new(self.version.subscribe())
            .map(move |_| this.snapshot())
            .throttle(interval)
    }

    /// Consume the realtime bus until it completes or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut events: RealtimeReceiver, cancel: CancellationToken) {
        info!("Live timing consumer started");
        let mut applied = 0u64;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    // Apply what is already queued; no requests go out during shutdown
                    while let Some(event) = events.try_recv() {
                        self.apply(&event);
                        applied += 1;
                    }
                    debug!(applied, "Live timing consumer cancelled");
                    break;
                }
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("Realtime bus completed");
                break;
            };
            self.apply(&event);
            self.request_missing(&event).await;
            applied += 1;
        }
        info!(applied, lost = events.lost(), "Live timing consumer stopped");
    }

    /// Ask the server for what the session is missing to make sense of `event`.
    async fn request_missing(&self, event: &SimEvent) {
        let Some(control) = &self.control else {
            return;
        };
        if matches!(event, SimEvent::SessionInfoReceived(_) | SimEvent::SessionEnded(_)) {
            return;
        }

        let Some(session) = self.current_session() else {
            let first = !std::mem::replace(&mut *self.session_requested.lock(), true);
            if first {
                debug!("Event without a session, requesting session info");
                if let Err(e) = control.request_session_info().await {
                    warn!(error = %e, "Failed to request session info");
                }
            }
            return;
        };

        let SimEvent::TelemetryUpdated(t) = event else {
            return;
        };
        let car_id = t.car_id;
        if session.has_driver(car_id) {
            return;
        }
        let first = self.requested_cars.lock().insert(car_id);
        if first {
            debug!(car_id, "Requesting car info for unknown car");
            if let Err(e) = control.request_car_info(car_id).await {
                warn!(car_id, error = %e, "Failed to request car info");
            }
        }
    }
}
