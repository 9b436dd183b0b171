//! Per-car state machines driven by telemetry.
//!
//! The trackers are synchronous and do no I/O. Timestamps are passed in by
//! the caller so a replay produces the same splits as the live feed did.
//!
//! - [`SectorTimingTracker`] times the three sectors of each lap
//! - [`PitStatusTracker`] reports pit corridor entry and exit
//! - [`SpeedTrapTracker`] reports speed trap line crossings

pub mod geometry;
mod pit;
mod sector;
mod speed_trap;

pub use pit::PitStatusTracker;
pub use sector::{SECTOR_BOUNDARIES, SectorSplit, SectorTimingTracker};
pub use speed_trap::{SpeedTrapTracker, TrapCrossing};
