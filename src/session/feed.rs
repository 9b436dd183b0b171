//! Session feed entries shown to spectators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CarId;

/// One line of the session feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedEvent {
    DriverJoined {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
    },
    DriverLeft {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
    },
    LapCompleted {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
        lap_time_ms: u32,
        /// No cuts on this lap
        valid: bool,
    },
    Collision {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
        other_car_id: Option<CarId>,
        other_driver_name: Option<String>,
        impact_speed_kmh: f32,
    },
    DriverInPit {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
    },
    MaxSpeed {
        occurred_at: DateTime<Utc>,
        car_id: CarId,
        driver_name: String,
        speed_kmh: f32,
        trap_name: String,
    },
}

impl FeedEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FeedEvent::DriverJoined { occurred_at, .. }
            | FeedEvent::DriverLeft { occurred_at, .. }
            | FeedEvent::LapCompleted { occurred_at, .. }
            | FeedEvent::Collision { occurred_at, .. }
            | FeedEvent::DriverInPit { occurred_at, .. }
            | FeedEvent::MaxSpeed { occurred_at, .. } => *occurred_at,
        }
    }

    pub fn car_id(&self) -> CarId {
        match self {
            FeedEvent::DriverJoined { car_id, .. }
            | FeedEvent::DriverLeft { car_id, .. }
            | FeedEvent::LapCompleted { car_id, .. }
            | FeedEvent::Collision { car_id, .. }
            | FeedEvent::DriverInPit { car_id, .. }
            | FeedEvent::MaxSpeed { car_id, .. } => *car_id,
        }
    }
}
