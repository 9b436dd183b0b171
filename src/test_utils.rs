//! Event builders and a recording sink shared by the unit tests and benches

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::pipeline::EventSink;
use crate::types::{
    CarId, CollisionDetected, CollisionKind, DriverIdentity, EventKind, LapCompleted,
    LeaderboardRow, PitStatusChanged, SectorCrossed, SessionEnded, SessionInfoReceived,
    SessionType, SimEvent, SpeedTrapFired, TelemetryUpdated,
};
use crate::{Result, TimingError};

pub fn session_received(track: &str) -> SessionInfoReceived {
    SessionInfoReceived {
        server_name: "Test Server".to_string(),
        track_name: track.to_string(),
        track_config: None,
        session_type: SessionType::Practice,
        time_limit_min: 30,
        lap_limit: 0,
        elapsed_ms: 0,
        ambient_temp: 22,
        road_temp: 30,
    }
}

pub fn session_info(track: &str) -> SimEvent {
    SimEvent::SessionInfoReceived(session_received(track))
}

pub fn identity(car_id: CarId, name: &str, guid: &str) -> DriverIdentity {
    DriverIdentity {
        car_id,
        car_model: "ks_mazda_mx5_cup".to_string(),
        car_skin: "00_official".to_string(),
        driver_name: name.to_string(),
        driver_guid: guid.to_string(),
    }
}

pub fn connected(car_id: CarId, name: &str, guid: &str) -> SimEvent {
    SimEvent::DriverConnected(identity(car_id, name, guid))
}

pub fn disconnected(car_id: CarId) -> SimEvent {
    SimEvent::DriverDisconnected(identity(car_id, "", ""))
}

pub fn telemetry(car_id: CarId, spline_position: f32) -> SimEvent {
    telemetry_at(car_id, spline_position, 0.0, 0.0, 150.0)
}

pub fn telemetry_at(car_id: CarId, spline_position: f32, x: f32, z: f32, speed_kmh: f32) -> SimEvent {
    SimEvent::TelemetryUpdated(TelemetryUpdated {
        car_id,
        spline_position,
        world_x: x,
        world_z: z,
        speed_kmh,
        gear: 4,
        engine_rpm: 6500,
    })
}

pub fn lap(car_id: CarId, lap_time_ms: u32, cuts: u8) -> SimEvent {
    lap_with_board(car_id, lap_time_ms, cuts, Vec::new())
}

pub fn lap_with_board(car_id: CarId, lap_time_ms: u32, cuts: u8, leaderboard: Vec<LeaderboardRow>) -> SimEvent {
    SimEvent::LapCompleted(LapCompleted { car_id, lap_time_ms, cuts, leaderboard })
}

pub fn sectors(car_id: CarId, times: &[u32], is_valid_lap: bool) -> SimEvent {
    SimEvent::SectorCrossed(SectorCrossed {
        car_id,
        sector_index: times.len().saturating_sub(1) as u8,
        sector_time_ms: times.last().copied().unwrap_or_default(),
        completed_sectors: times.to_vec(),
        is_valid_lap,
    })
}

pub fn collision(car_id: CarId, other_car_id: Option<CarId>, impact_speed_kmh: f32) -> SimEvent {
    SimEvent::CollisionDetected(CollisionDetected {
        car_id,
        kind: if other_car_id.is_some() { CollisionKind::Car } else { CollisionKind::Environment },
        other_car_id,
        impact_speed_kmh,
        occurred_at: Utc::now(),
    })
}

/// One representative event of each kind, all about car 1.
pub fn sample_event(kind: EventKind) -> SimEvent {
    match kind {
        EventKind::SessionInfoReceived => session_info("ks_test"),
        EventKind::SessionEnded => SimEvent::SessionEnded(SessionEnded),
        EventKind::DriverConnected => connected(1, "Test Driver", "76561190000000001"),
        EventKind::DriverDisconnected => disconnected(1),
        EventKind::CarInfoReceived => SimEvent::CarInfoReceived(identity(1, "Test Driver", "76561190000000001")),
        EventKind::TelemetryUpdated => telemetry(1, 0.25),
        EventKind::LapCompleted => lap(1, 90_000, 0),
        EventKind::SectorCrossed => sectors(1, &[30_000], false),
        EventKind::PitStatusChanged => SimEvent::PitStatusChanged(PitStatusChanged { car_id: 1, is_in_pit: true }),
        EventKind::SpeedTrapFired => SimEvent::SpeedTrapFired(SpeedTrapFired {
            car_id: 1,
            trap_id: Uuid::nil(),
            trap_name: "Main Straight".to_string(),
            speed_kmh: 250.0,
        }),
        EventKind::CollisionDetected => collision(1, Some(2), 35.0),
    }
}

/// Give spawned tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Sink that records every published event.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SimEvent>>>,
    attempts: Arc<Mutex<usize>>,
    fail_on: Arc<HashSet<usize>>,
}

impl RecordingSink {
    /// Reject the publish attempts with these 1-based numbers.
    pub fn failing_on(attempts: &[usize]) -> Self {
        Self { fail_on: Arc::new(attempts.iter().copied().collect()), ..Self::default() }
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &SimEvent) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };
        if self.fail_on.contains(&attempt) {
            return Err(TimingError::channel_closed("recording"));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
