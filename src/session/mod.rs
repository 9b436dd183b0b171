//! Live session state folded from the realtime bus.
//!
//! A [`LiveTimingSession`] exists from `SessionInfoReceived` until
//! `SessionEnded`. One writer applies events in delivery order while any
//! number of readers query it:
//!
//! - the driver map sits behind a `parking_lot::RwLock`; every update is a
//!   single write-locked read-modify-write of one driver, readers get clones
//! - the feed, lap sample buffers and best-lap table use plain mutexes since
//!   they change at lap frequency
//!
//! [`LiveTiming`] owns the current session and runs the consumer task.

mod driver;
mod feed;
mod service;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::types::{
    CarId, CollisionDetected, DriverIdentity, LapCompleted, PitStatusChanged, SectorCrossed,
    SessionInfoReceived, SimEvent, SpeedTrapFired, TelemetryUpdated,
};

pub use driver::{LiveDriver, best_sectors};
pub use feed::FeedEvent;
pub use service::{LiveTiming, LiveTimingSnapshot};

/// Upper bound on buffered samples per lap; later samples are dropped.
pub const MAX_SAMPLES_PER_LAP: usize = 2000;
/// Spline progress required before another sample is buffered.
pub const MIN_SPLINE_STEP: f32 = 0.002;
/// Samples needed before a best lap is kept as reference telemetry.
pub const MIN_SAMPLES_FOR_REFERENCE_LAP: usize = 20;

/// One buffered position along a lap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LapTelemetrySample {
    pub spline_position: f32,
    pub world_x: f32,
    pub world_z: f32,
    pub speed_kmh: f32,
    pub gear: u8,
}

/// Reference telemetry of a driver's best lap in one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestLapTelemetry {
    pub driver_guid: String,
    pub driver_name: String,
    pub car_model: String,
    pub lap_time_ms: u32,
    pub samples: Vec<LapTelemetrySample>,
}

/// Aggregate state of the running session.
#[derive(Debug)]
pub struct LiveTimingSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    info: SessionInfoReceived,
    drivers: RwLock<HashMap<CarId, LiveDriver>>,
    feed: Mutex<Vec<FeedEvent>>,
    lap_samples: Mutex<HashMap<CarId, Vec<LapTelemetrySample>>>,
    best_laps: Mutex<HashMap<(String, String), BestLapTelemetry>>,
}

impl LiveTimingSession {
    pub fn new(info: SessionInfoReceived) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            info,
            drivers: RwLock::new(HashMap::new()),
            feed: Mutex::new(Vec::new()),
            lap_samples: Mutex::new(HashMap::new()),
            best_laps: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn info(&self) -> &SessionInfoReceived {
        &self.info
    }

    /// Fold one event into the session.
    ///
    /// Session lifecycle events are handled by [`LiveTiming`]; here they are
    /// no-ops.
    pub fn apply(&self, event: &SimEvent) {
        trace!(kind = %event.kind(), car_id = ?event.car_id(), "Applying event");
        match event {
            SimEvent::SessionInfoReceived(_) | SimEvent::SessionEnded(_) => {}
            SimEvent::DriverConnected(identity) => self.on_driver_connected(identity),
            SimEvent::CarInfoReceived(identity) => self.on_car_info(identity),
            SimEvent::DriverDisconnected(identity) => self.on_driver_disconnected(identity),
            SimEvent::TelemetryUpdated(t) => self.on_telemetry(t),
            SimEvent::LapCompleted(lap) => self.on_lap_completed(lap),
            SimEvent::SectorCrossed(sector) => self.on_sector_crossed(sector),
            SimEvent::PitStatusChanged(pit) => self.on_pit_status(pit),
            SimEvent::SpeedTrapFired(trap) => self.on_speed_trap(trap),
            SimEvent::CollisionDetected(collision) => self.on_collision(collision),
        }
    }

    pub fn driver(&self, car_id: CarId) -> Option<LiveDriver> {
        self.drivers.read().get(&car_id).cloned()
    }

    pub fn has_driver(&self, car_id: CarId) -> bool {
        self.drivers.read().contains_key(&car_id)
    }

    /// Connected drivers by position; unranked drivers last, ties by car id.
    pub fn leaderboard(&self) -> Vec<LiveDriver> {
        let mut drivers: Vec<_> =
            self.drivers.read().values().filter(|d| d.is_connected).cloned().collect();
        drivers.sort_by_key(|d| (d.position.unwrap_or(u16::MAX), d.car_id));
        drivers
    }

    pub fn feed_events(&self) -> Vec<FeedEvent> {
        self.feed.lock().clone()
    }

    pub fn feed_len(&self) -> usize {
        self.feed.lock().len()
    }

    pub fn best_laps(&self) -> Vec<BestLapTelemetry> {
        self.best_laps.lock().values().cloned().collect()
    }

    fn push_feed(&self, entry: FeedEvent) {
        self.feed.lock().push(entry);
    }

    fn on_driver_connected(&self, identity: &DriverIdentity) {
        {
            let mut drivers = self.drivers.write();
            match drivers.get_mut(&identity.car_id) {
                Some(existing)
                    if identity.driver_guid.is_empty()
                        || existing.driver_guid == identity.driver_guid =>
                {
                    existing.merge_identity(identity);
                }
                _ => {
                    drivers.insert(identity.car_id, LiveDriver::new(identity));
                    self.lap_samples.lock().remove(&identity.car_id);
                }
            }
        }
        debug!(car_id = identity.car_id, driver = %identity.driver_name, "Driver joined");
        self.push_feed(FeedEvent::DriverJoined {
            occurred_at: Utc::now(),
            car_id: identity.car_id,
            driver_name: identity.driver_name.clone(),
        });
    }

    fn on_car_info(&self, identity: &DriverIdentity) {
        let mut drivers = self.drivers.write();
        drivers
            .entry(identity.car_id)
            .and_modify(|existing| existing.merge_identity(identity))
            .or_insert_with(|| LiveDriver::new(identity));
    }

    fn on_driver_disconnected(&self, identity: &DriverIdentity) {
        let name = {
            let mut drivers = self.drivers.write();
            let Some(driver) = drivers.get_mut(&identity.car_id) else {
                return;
            };
            driver.is_connected = false;
            driver.driver_name.clone()
        };
        debug!(car_id = identity.car_id, driver = %name, "Driver left");
        self.push_feed(FeedEvent::DriverLeft {
            occurred_at: Utc::now(),
            car_id: identity.car_id,
            driver_name: name,
        });
    }

    fn on_telemetry(&self, t: &TelemetryUpdated) {
        {
            let mut drivers = self.drivers.write();
            let Some(driver) = drivers.get_mut(&t.car_id) else {
                trace!(car_id = t.car_id, "Telemetry for unknown car dropped");
                return;
            };
            driver.apply_telemetry(t);
        }

        let mut buffers = self.lap_samples.lock();
        let buffer = buffers.entry(t.car_id).or_default();
        if buffer.len() >= MAX_SAMPLES_PER_LAP {
            return;
        }
        if let Some(last) = buffer.last()
            && (t.spline_position - last.spline_position).abs() < MIN_SPLINE_STEP
        {
            return;
        }
        buffer.push(LapTelemetrySample {
            spline_position: t.spline_position,
            world_x: t.world_x,
            world_z: t.world_z,
            speed_kmh: t.speed_kmh,
            gear: t.gear,
        });
    }

    fn on_sector_crossed(&self, sector: &SectorCrossed) {
        if let Some(driver) = self.drivers.write().get_mut(&sector.car_id) {
            driver.apply_sectors(&sector.completed_sectors, sector.is_valid_lap);
        }
    }

    fn on_lap_completed(&self, lap: &LapCompleted) {
        let completed = {
            let mut drivers = self.drivers.write();
            drivers.get_mut(&lap.car_id).map(|driver| {
                let is_new_best = driver.record_lap(lap.lap_time_ms, lap.cuts);
                (is_new_best, driver.driver_guid.clone(), driver.driver_name.clone(), driver.car_model.clone())
            })
        };

        if let Some((is_new_best, driver_guid, driver_name, car_model)) = completed {
            let samples = self.lap_samples.lock().remove(&lap.car_id).unwrap_or_default();
            if is_new_best && samples.len() >= MIN_SAMPLES_FOR_REFERENCE_LAP {
                debug!(car_id = lap.car_id, samples = samples.len(), lap_time_ms = lap.lap_time_ms, "Reference lap stored");
                self.best_laps.lock().insert(
                    (driver_guid.clone(), car_model.clone()),
                    BestLapTelemetry {
                        driver_guid,
                        driver_name: driver_name.clone(),
                        car_model,
                        lap_time_ms: lap.lap_time_ms,
                        samples,
                    },
                );
            }
            self.push_feed(FeedEvent::LapCompleted {
                occurred_at: Utc::now(),
                car_id: lap.car_id,
                driver_name,
                lap_time_ms: lap.lap_time_ms,
                valid: lap.cuts == 0,
            });
        }

        let mut drivers = self.drivers.write();
        for (index, row) in lap.leaderboard.iter().enumerate() {
            if let Some(driver) = drivers.get_mut(&row.car_id) {
                let position = u16::try_from(index + 1).unwrap_or(u16::MAX);
                driver.merge_leaderboard(position, row.best_lap_time_ms);
            }
        }
    }

    fn on_pit_status(&self, pit: &PitStatusChanged) {
        let name = {
            let mut drivers = self.drivers.write();
            let Some(driver) = drivers.get_mut(&pit.car_id) else {
                return;
            };
            driver.is_in_pit = pit.is_in_pit;
            driver.is_in_out_lap |= pit.is_in_pit;
            driver.driver_name.clone()
        };
        if pit.is_in_pit {
            self.push_feed(FeedEvent::DriverInPit {
                occurred_at: Utc::now(),
                car_id: pit.car_id,
                driver_name: name,
            });
        }
    }

    fn on_speed_trap(&self, trap: &SpeedTrapFired) {
        let name = {
            let mut drivers = self.drivers.write();
            match drivers.get_mut(&trap.car_id) {
                Some(driver) if trap.speed_kmh > driver.max_speed_kmh => {
                    driver.max_speed_kmh = trap.speed_kmh;
                    driver.driver_name.clone()
                }
                _ => return,
            }
        };
        self.push_feed(FeedEvent::MaxSpeed {
            occurred_at: Utc::now(),
            car_id: trap.car_id,
            driver_name: name,
            speed_kmh: trap.speed_kmh,
            trap_name: trap.trap_name.clone(),
        });
    }

    fn on_collision(&self, collision: &CollisionDetected) {
        let (driver_name, other_driver_name) = {
            let mut drivers = self.drivers.write();
            let mut bump = |car_id: CarId| {
                drivers.get_mut(&car_id).map(|driver| {
                    driver.incident_count += 1;
                    driver.driver_name.clone()
                })
            };
            let name = bump(collision.car_id);
            let other = collision.other_car_id.and_then(&mut bump);
            (name, other)
        };
        self.push_feed(FeedEvent::Collision {
            occurred_at: collision.occurred_at,
            car_id: collision.car_id,
            driver_name: driver_name.unwrap_or_else(|| format!("Car #{}", collision.car_id)),
            other_car_id: collision.other_car_id,
            other_driver_name,
            impact_speed_kmh: collision.impact_speed_kmh,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        collision, connected, disconnected, lap, lap_with_board, sample_event, sectors,
        session_received, telemetry,
    };
    use crate::types::{EventKind, LeaderboardRow};

    fn session() -> LiveTimingSession {
        LiveTimingSession::new(session_received("ks_spa"))
    }

    #[test]
    fn every_kind_is_applied_without_panicking() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        for kind in EventKind::ALL {
            session.apply(&sample_event(kind));
        }
    }

    #[test]
    fn telemetry_for_unknown_cars_is_dropped() {
        let session = session();
        session.apply(&telemetry(9, 0.5));
        assert!(session.driver(9).is_none());
        assert!(session.leaderboard().is_empty());
    }

    #[test]
    fn car_info_merges_and_reconnect_with_new_guid_replaces() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&lap(1, 90_000, 0));
        session.apply(&SimEvent::CarInfoReceived(crate::test_utils::identity(1, "Alice B.", "")));
        let driver = session.driver(1).unwrap();
        assert_eq!(driver.driver_name, "Alice B.");
        assert_eq!(driver.driver_guid, "guid-a");
        assert_eq!(driver.total_laps, 1);

        session.apply(&connected(1, "Bob", "guid-b"));
        let driver = session.driver(1).unwrap();
        assert_eq!(driver.driver_name, "Bob");
        assert_eq!(driver.total_laps, 0);
    }

    #[test]
    fn disconnect_keeps_history_but_leaves_leaderboard() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&connected(2, "Bob", "guid-b"));
        session.apply(&disconnected(1));
        assert_eq!(session.leaderboard().len(), 1);
        assert!(!session.driver(1).unwrap().is_connected);

        let kinds: Vec<_> = session.feed_events().iter().map(|f| f.car_id()).collect();
        assert_eq!(kinds, vec![1, 2, 1]);
    }

    #[test]
    fn best_sector_example() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&sectors(1, &[31_000, 29_000, 33_000], true));
        session.apply(&sectors(1, &[30_500, 29_500, 32_000], true));
        assert_eq!(session.driver(1).unwrap().best_sector_times_ms, vec![30_500, 29_000, 32_000]);
    }

    #[test]
    fn leaderboard_merge_example() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&connected(2, "Bob", "guid-b"));
        session.apply(&lap(1, 92_000, 0));

        let row = |car_id, best| LeaderboardRow { car_id, best_lap_time_ms: best, total_laps: 1 };
        session.apply(&lap_with_board(2, 95_000, 0, vec![row(2, 0), row(1, 0)]));
        assert_eq!(session.driver(1).unwrap().best_lap_time_ms, Some(92_000));
        assert_eq!(session.driver(1).unwrap().position, Some(2));

        session.apply(&lap_with_board(2, 96_000, 0, vec![row(1, 91_000), row(2, 95_000)]));
        assert_eq!(session.driver(1).unwrap().best_lap_time_ms, Some(91_000));

        let order: Vec<_> = session.leaderboard().iter().map(|d| d.car_id).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn pit_entry_sets_out_lap_until_next_lap() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&SimEvent::PitStatusChanged(PitStatusChanged { car_id: 1, is_in_pit: true }));
        session.apply(&SimEvent::PitStatusChanged(PitStatusChanged { car_id: 1, is_in_pit: false }));
        let driver = session.driver(1).unwrap();
        assert!(!driver.is_in_pit);
        assert!(driver.is_in_out_lap);

        session.apply(&lap(1, 120_000, 0));
        assert!(!session.driver(1).unwrap().is_in_out_lap);
        // join, pit entry, lap
        assert_eq!(session.feed_len(), 3);
    }

    #[test]
    fn collisions_count_for_both_cars() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        session.apply(&connected(2, "Bob", "guid-b"));
        session.apply(&collision(1, Some(2), 42.0));
        session.apply(&collision(1, None, 12.0));
        assert_eq!(session.driver(1).unwrap().incident_count, 2);
        assert_eq!(session.driver(2).unwrap().incident_count, 1);
        match session.feed_events().last() {
            Some(FeedEvent::Collision { other_car_id, .. }) => assert_eq!(*other_car_id, None),
            other => panic!("unexpected feed entry {:?}", other),
        }
    }

    #[test]
    fn speed_trap_only_feeds_new_maximums() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        let trap = |speed| {
            SimEvent::SpeedTrapFired(SpeedTrapFired {
                car_id: 1,
                trap_id: Uuid::nil(),
                trap_name: "Kemmel".to_string(),
                speed_kmh: speed,
            })
        };
        session.apply(&trap(280.0));
        session.apply(&trap(275.0));
        session.apply(&trap(281.5));
        assert_eq!(session.driver(1).unwrap().max_speed_kmh, 281.5);
        let max_speed_entries = session
            .feed_events()
            .iter()
            .filter(|f| matches!(f, FeedEvent::MaxSpeed { .. }))
            .count();
        assert_eq!(max_speed_entries, 2);
    }

    #[test]
    fn reference_lap_needs_enough_distinct_samples() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        for i in 0..30 {
            // Stationary repeats are filtered
            session.apply(&telemetry(1, i as f32 * 0.03));
            session.apply(&telemetry(1, i as f32 * 0.03 + 0.001));
        }
        session.apply(&lap(1, 95_000, 0));
        let best = session.best_laps();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].samples.len(), 30);
        assert_eq!(best[0].lap_time_ms, 95_000);

        // A faster lap with too few samples keeps the reference
        session.apply(&telemetry(1, 0.1));
        session.apply(&lap(1, 94_000, 0));
        assert_eq!(session.best_laps()[0].lap_time_ms, 95_000);
    }

    #[test]
    fn sample_buffer_is_bounded() {
        let session = session();
        session.apply(&connected(1, "Alice", "guid-a"));
        for i in 0..(MAX_SAMPLES_PER_LAP + 100) {
            session.apply(&telemetry(1, (i as f32 * 0.003) % 1.0));
        }
        assert_eq!(session.lap_samples.lock()[&1].len(), MAX_SAMPLES_PER_LAP);
    }
}
