//! Sector split timing from spline position samples

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, trace};

use crate::types::CarId;

/// Spline positions of the sector 1 and sector 2 end lines.
pub const SECTOR_BOUNDARIES: [f32; 2] = [1.0 / 3.0, 2.0 / 3.0];

/// A delta below this means the car passed the start/finish line.
const LAP_WRAP_DELTA: f32 = -0.5;
/// A forward jump above this is a teleport, not driving.
const FORWARD_WARP_DELTA: f32 = 0.3;
/// A backward move below this is reversing, not jitter.
const BACKWARD_DELTA: f32 = -0.05;

/// One completed sector within the current lap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorSplit {
    /// 0 or 1; sector 3 is derived from the lap time
    pub sector_index: u8,
    pub sector_time_ms: u32,
    /// `[s1]` after sector 1, `[s1, s2]` after sector 2
    pub completed_sectors: Vec<u32>,
}

#[derive(Debug, Clone)]
struct CarSectorState {
    current_sector: u8,
    sector_start: Instant,
    previous_spline: f32,
    previous_update: Instant,
    s1_ms: u32,
    s2_ms: u32,
}

fn sector_of(spline: f32) -> u8 {
    if spline < SECTOR_BOUNDARIES[0] {
        0
    } else if spline < SECTOR_BOUNDARIES[1] {
        1
    } else {
        2
    }
}

/// Per-car sector state machine.
#[derive(Debug, Default)]
pub struct SectorTimingTracker {
    cars: HashMap<CarId, CarSectorState>,
}

impl SectorTimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one spline sample taken at `now`. Returns the sector that was
    /// completed by this sample, if any.
    pub fn on_telemetry(&mut self, car_id: CarId, spline: f32, now: Instant) -> Option<SectorSplit> {
        let Some(state) = self.cars.get_mut(&car_id) else {
            self.cars.insert(
                car_id,
                CarSectorState {
                    current_sector: sector_of(spline),
                    sector_start: now,
                    previous_spline: spline,
                    previous_update: now,
                    s1_ms: 0,
                    s2_ms: 0,
                },
            );
            return None;
        };

        let previous_spline = state.previous_spline;
        let previous_update = state.previous_update;
        state.previous_spline = spline;
        state.previous_update = now;

        let delta = spline - previous_spline;

        if delta < LAP_WRAP_DELTA {
            // S1 and S2 stay: the lap completed packet may still be in flight
            trace!(car_id, previous_spline, spline, "Lap wrap");
            state.current_sector = 0;
            state.sector_start = now;
            return None;
        }

        if delta > FORWARD_WARP_DELTA || delta < BACKWARD_DELTA {
            debug!(car_id, previous_spline, spline, "Spline jump, sector timing invalidated");
            state.current_sector = sector_of(spline);
            state.sector_start = now;
            state.s1_ms = 0;
            state.s2_ms = 0;
            return None;
        }

        let sector = state.current_sector;
        let boundary = *SECTOR_BOUNDARIES.get(sector as usize)?;
        if !(previous_spline < boundary && boundary <= spline) {
            return None;
        }

        let fraction = f64::from((boundary - previous_spline) / delta);
        let elapsed = now.saturating_duration_since(previous_update);
        let crossed_at = previous_update + elapsed.mul_f64(fraction.clamp(0.0, 1.0));
        let sector_ms = crossed_at.saturating_duration_since(state.sector_start).as_millis();
        let sector_time_ms = u32::try_from(sector_ms).unwrap_or(u32::MAX).max(1);

        let completed_sectors = if sector == 0 {
            state.s1_ms = sector_time_ms;
            vec![sector_time_ms]
        } else {
            state.s2_ms = sector_time_ms;
            vec![state.s1_ms, sector_time_ms]
        };
        state.current_sector = sector + 1;
        state.sector_start = crossed_at;

        trace!(car_id, sector_index = sector, sector_time_ms, "Sector crossed");
        Some(SectorSplit { sector_index: sector, sector_time_ms, completed_sectors })
    }

    /// Close the lap for `car_id` and derive sector 3 from the lap time.
    ///
    /// Returns `[s1, s2, s3]` only when all three are positive. The lap
    /// accumulators are reset either way.
    pub fn on_lap_completed(&mut self, car_id: CarId, lap_time_ms: u32) -> Option<[u32; 3]> {
        let state = self.cars.get_mut(&car_id)?;
        let (s1, s2) = (state.s1_ms, state.s2_ms);
        state.s1_ms = 0;
        state.s2_ms = 0;
        state.current_sector = 0;

        let s3 = i64::from(lap_time_ms) - i64::from(s1) - i64::from(s2);
        if s1 == 0 || s2 == 0 || s3 <= 0 {
            debug!(car_id, lap_time_ms, s1, s2, s3, "Sector splits unavailable for lap");
            return None;
        }
        Some([s1, s2, s3 as u32])
    }

    pub fn reset_car(&mut self, car_id: CarId) {
        self.cars.remove(&car_id);
    }

    pub fn reset(&mut self) {
        self.cars.clear();
    }

    /// Number of cars with sector state.
    pub fn tracked_cars(&self) -> usize {
        self.cars.len()
    }
}
