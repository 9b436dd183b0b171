//! Per-car state inside a live session

use serde::{Deserialize, Serialize};

use crate::types::{CarId, DriverIdentity, TelemetryUpdated};

/// Everything known about the driver in one car slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDriver {
    pub car_id: CarId,
    pub driver_guid: String,
    pub driver_name: String,
    pub car_model: String,
    pub car_skin: String,
    pub is_connected: bool,

    /// Only ever set from laps without cuts
    pub best_lap_time_ms: Option<u32>,
    pub last_lap_time_ms: Option<u32>,
    pub total_laps: u16,
    pub last_lap_cuts: u8,
    /// Race position from the last leaderboard, 1-based
    pub position: Option<u16>,
    pub last_sector_times_ms: Vec<u32>,
    /// Element-wise best over clean laps; empty until the first clean lap
    pub best_sector_times_ms: Vec<u32>,

    pub spline_position: f32,
    pub world_x: f32,
    pub world_z: f32,
    pub speed_kmh: f32,
    pub gear: u8,
    pub engine_rpm: u16,

    pub is_in_pit: bool,
    /// Set on pit entry, cleared by the next completed lap
    pub is_in_out_lap: bool,
    pub incident_count: u32,
    pub max_speed_kmh: f32,
}

impl LiveDriver {
    pub fn new(identity: &DriverIdentity) -> Self {
        Self {
            car_id: identity.car_id,
            driver_guid: identity.driver_guid.clone(),
            driver_name: identity.driver_name.clone(),
            car_model: identity.car_model.clone(),
            car_skin: identity.car_skin.clone(),
            is_connected: true,
            best_lap_time_ms: None,
            last_lap_time_ms: None,
            total_laps: 0,
            last_lap_cuts: 0,
            position: None,
            last_sector_times_ms: Vec::new(),
            best_sector_times_ms: Vec::new(),
            spline_position: 0.0,
            world_x: 0.0,
            world_z: 0.0,
            speed_kmh: 0.0,
            gear: 0,
            engine_rpm: 0,
            is_in_pit: false,
            is_in_out_lap: false,
            incident_count: 0,
            max_speed_kmh: 0.0,
        }
    }

    /// Overwrite identity fields with the non-empty incoming ones.
    pub fn merge_identity(&mut self, identity: &DriverIdentity) {
        merge_field(&mut self.driver_guid, &identity.driver_guid);
        merge_field(&mut self.driver_name, &identity.driver_name);
        merge_field(&mut self.car_model, &identity.car_model);
        merge_field(&mut self.car_skin, &identity.car_skin);
        self.is_connected = true;
    }

    pub fn apply_telemetry(&mut self, t: &TelemetryUpdated) {
        self.spline_position = t.spline_position;
        self.world_x = t.world_x;
        self.world_z = t.world_z;
        self.speed_kmh = t.speed_kmh;
        self.gear = t.gear;
        self.engine_rpm = t.engine_rpm;
        self.is_connected = true;
    }

    /// Record sector times; bests only move on a clean lap with all three.
    pub fn apply_sectors(&mut self, sectors: &[u32], is_valid_lap: bool) {
        self.last_sector_times_ms = sectors.to_vec();
        if is_valid_lap && sectors.len() == 3 {
            self.best_sector_times_ms = best_sectors(&self.best_sector_times_ms, sectors);
        }
    }

    /// Record a lap for this car. Returns `true` when it is a new personal best.
    pub fn record_lap(&mut self, lap_time_ms: u32, cuts: u8) -> bool {
        let is_new_best =
            cuts == 0 && self.best_lap_time_ms.is_none_or(|best| lap_time_ms < best);
        if is_new_best {
            self.best_lap_time_ms = Some(lap_time_ms);
        }
        self.last_lap_time_ms = Some(lap_time_ms);
        self.total_laps = self.total_laps.saturating_add(1);
        self.last_lap_cuts = cuts;
        self.is_in_out_lap = false;
        is_new_best
    }

    /// Apply one server leaderboard row. A reported best of 0 means unknown.
    pub fn merge_leaderboard(&mut self, position: u16, reported_best_ms: u32) {
        self.position = Some(position);
        let reported = (reported_best_ms > 0).then_some(reported_best_ms);
        self.best_lap_time_ms = match (reported, self.best_lap_time_ms) {
            (None, local) => local,
            (Some(reported), None) => Some(reported),
            (Some(reported), Some(local)) => Some(reported.min(local)),
        };
    }
}

fn merge_field(stored: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() {
        incoming.clone_into(stored);
    }
}

/// Element-wise minimum; missing existing entries count as unset.
pub fn best_sectors(existing: &[u32], new: &[u32]) -> Vec<u32> {
    new.iter()
        .enumerate()
        .map(|(i, &time)| existing.get(i).map_or(time, |&best| best.min(time)))
        .collect()
}
