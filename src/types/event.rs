//! Domain events produced by the event source and the enrichers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionType;

/// Server car slot index. Reused across a session, not a driver identity.
pub type CarId = u8;

/// A new session started (or the server answered a session info request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfoReceived {
    pub server_name: String,
    pub track_name: String,
    pub track_config: Option<String>,
    pub session_type: SessionType,
    pub time_limit_min: u16,
    pub lap_limit: u16,
    pub elapsed_ms: i32,
    pub ambient_temp: u8,
    pub road_temp: u8,
}

/// The current session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded;

/// Identity payload shared by connect, disconnect and car info events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub car_id: CarId,
    pub car_model: String,
    pub car_skin: String,
    pub driver_name: String,
    pub driver_guid: String,
}

/// Live position and engine sample for one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdated {
    pub car_id: CarId,
    /// Normalized track progress in `[0, 1)`
    pub spline_position: f32,
    pub world_x: f32,
    pub world_z: f32,
    pub speed_kmh: f32,
    pub gear: u8,
    pub engine_rpm: u16,
}

/// One row of the server's leaderboard as sent with every lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub car_id: CarId,
    /// 0 means the server does not know a best lap yet
    pub best_lap_time_ms: u32,
    pub total_laps: u16,
}

/// A car crossed the finish line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCompleted {
    pub car_id: CarId,
    pub lap_time_ms: u32,
    pub cuts: u8,
    /// Rows in race order, position = index + 1
    pub leaderboard: Vec<LeaderboardRow>,
}

/// Derived: a car completed one of the three sectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorCrossed {
    pub car_id: CarId,
    pub sector_index: u8,
    pub sector_time_ms: u32,
    /// All sector times of this lap so far, e.g. `[s1]`, `[s1, s2]` or `[s1, s2, s3]`
    pub completed_sectors: Vec<u32>,
    pub is_valid_lap: bool,
}

/// Derived: a car entered or left the pit corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitStatusChanged {
    pub car_id: CarId,
    pub is_in_pit: bool,
}

/// Derived: a car crossed a speed trap line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTrapFired {
    pub car_id: CarId,
    pub trap_id: Uuid,
    pub trap_name: String,
    pub speed_kmh: f32,
}

/// What a car collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionKind {
    Car,
    Environment,
}

/// A car hit another car or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionDetected {
    pub car_id: CarId,
    pub kind: CollisionKind,
    pub other_car_id: Option<CarId>,
    pub impact_speed_kmh: f32,
    pub occurred_at: DateTime<Utc>,
}

/// Every event flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SimEvent {
    SessionInfoReceived(SessionInfoReceived),
    SessionEnded(SessionEnded),
    DriverConnected(DriverIdentity),
    DriverDisconnected(DriverIdentity),
    CarInfoReceived(DriverIdentity),
    TelemetryUpdated(TelemetryUpdated),
    LapCompleted(LapCompleted),
    SectorCrossed(SectorCrossed),
    PitStatusChanged(PitStatusChanged),
    SpeedTrapFired(SpeedTrapFired),
    CollisionDetected(CollisionDetected),
}

/// Discriminant of [`SimEvent`], used for logging and routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    SessionInfoReceived,
    SessionEnded,
    DriverConnected,
    DriverDisconnected,
    CarInfoReceived,
    TelemetryUpdated,
    LapCompleted,
    SectorCrossed,
    PitStatusChanged,
    SpeedTrapFired,
    CollisionDetected,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::SessionInfoReceived,
        EventKind::SessionEnded,
        EventKind::DriverConnected,
        EventKind::DriverDisconnected,
        EventKind::CarInfoReceived,
        EventKind::TelemetryUpdated,
        EventKind::LapCompleted,
        EventKind::SectorCrossed,
        EventKind::PitStatusChanged,
        EventKind::SpeedTrapFired,
        EventKind::CollisionDetected,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::SessionInfoReceived => "SessionInfoReceived",
            EventKind::SessionEnded => "SessionEnded",
            EventKind::DriverConnected => "DriverConnected",
            EventKind::DriverDisconnected => "DriverDisconnected",
            EventKind::CarInfoReceived => "CarInfoReceived",
            EventKind::TelemetryUpdated => "TelemetryUpdated",
            EventKind::LapCompleted => "LapCompleted",
            EventKind::SectorCrossed => "SectorCrossed",
            EventKind::PitStatusChanged => "PitStatusChanged",
            EventKind::SpeedTrapFired => "SpeedTrapFired",
            EventKind::CollisionDetected => "CollisionDetected",
        }
    }

    /// Events derived by enrichers rather than decoded from the wire.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            EventKind::SectorCrossed | EventKind::PitStatusChanged | EventKind::SpeedTrapFired
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::SessionInfoReceived(_) => EventKind::SessionInfoReceived,
            SimEvent::SessionEnded(_) => EventKind::SessionEnded,
            SimEvent::DriverConnected(_) => EventKind::DriverConnected,
            SimEvent::DriverDisconnected(_) => EventKind::DriverDisconnected,
            SimEvent::CarInfoReceived(_) => EventKind::CarInfoReceived,
            SimEvent::TelemetryUpdated(_) => EventKind::TelemetryUpdated,
            SimEvent::LapCompleted(_) => EventKind::LapCompleted,
            SimEvent::SectorCrossed(_) => EventKind::SectorCrossed,
            SimEvent::PitStatusChanged(_) => EventKind::PitStatusChanged,
            SimEvent::SpeedTrapFired(_) => EventKind::SpeedTrapFired,
            SimEvent::CollisionDetected(_) => EventKind::CollisionDetected,
        }
    }

    /// Car the event is about, if any.
    pub fn car_id(&self) -> Option<CarId> {
        match self {
            SimEvent::SessionInfoReceived(_) | SimEvent::SessionEnded(_) => None,
            SimEvent::DriverConnected(d)
            | SimEvent::DriverDisconnected(d)
            | SimEvent::CarInfoReceived(d) => Some(d.car_id),
            SimEvent::TelemetryUpdated(t) => Some(t.car_id),
            SimEvent::LapCompleted(l) => Some(l.car_id),
            SimEvent::SectorCrossed(s) => Some(s.car_id),
            SimEvent::PitStatusChanged(p) => Some(p.car_id),
            SimEvent::SpeedTrapFired(s) => Some(s.car_id),
            SimEvent::CollisionDetected(c) => Some(c.car_id),
        }
    }
}
