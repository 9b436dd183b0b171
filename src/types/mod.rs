//! Core domain types.
//!
//! This module provides the data that flows through the live timing core:
//! - [`SimEvent`] is the closed set of events, one variant per kind, each
//!   wrapping an immutable payload struct
//! - [`EventKind`] is the discriminant used for logging and exhaustiveness checks
//! - [`SessionType`] maps the server's session type byte
//! - [`WorldPoint`], [`PitLaneDefinition`], [`SpeedTrapDefinition`] and
//!   [`TrackConfig`] describe per-track points of interest
//!
//! ```rust
//! use paddock::types::{PitStatusChanged, SimEvent, EventKind};
//!
//! let event = SimEvent::PitStatusChanged(PitStatusChanged { car_id: 3, is_in_pit: true });
//! assert_eq!(event.kind(), EventKind::PitStatusChanged);
//! assert_eq!(event.car_id(), Some(3));
//! ```

mod event;
mod session_type;
mod track;

pub use event::{
    CarId, CollisionDetected, CollisionKind, DriverIdentity, EventKind, LapCompleted,
    LeaderboardRow, PitStatusChanged, SectorCrossed, SessionEnded, SessionInfoReceived, SimEvent,
    SpeedTrapFired, TelemetryUpdated,
};
pub use session_type::SessionType;
pub use track::{
    PitLaneDefinition, SpeedTrapDefinition, TrackConfig, WorldPoint, sanitize_track_name,
};
