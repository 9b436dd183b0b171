//! Pit lane occupancy from world positions

use std::collections::HashMap;

use tracing::{debug, trace};

use super::geometry::polygon_contains;
use crate::types::{CarId, WorldPoint};

/// Tracks which cars are inside the pit corridor.
///
/// Without a polygon the tracker is inert.
#[derive(Debug, Default)]
pub struct PitStatusTracker {
    polygon: Option<Vec<WorldPoint>>,
    in_pit: HashMap<CarId, bool>,
}

impl PitStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the corridor for the current session. Polygons with fewer than
    /// three vertices disable detection. Either way every car's status is
    /// forgotten.
    pub fn set_polygon(&mut self, polygon: Vec<WorldPoint>) {
        self.in_pit.clear();
        if polygon.len() < 3 {
            debug!(vertices = polygon.len(), "Ignoring degenerate pit polygon");
            self.polygon = None;
            return;
        }
        debug!(vertices = polygon.len(), "Pit polygon loaded");
        self.polygon = Some(polygon);
    }

    pub fn has_polygon(&self) -> bool {
        self.polygon.is_some()
    }

    /// Returns the new status when it differs from the last known one. The
    /// first sample of a car always reports its status.
    pub fn on_telemetry(&mut self, car_id: CarId, x: f32, z: f32) -> Option<bool> {
        let polygon = self.polygon.as_ref()?;
        let inside = polygon_contains(polygon, WorldPoint::new(x, z));
        let previous = self.in_pit.insert(car_id, inside);
        if previous == Some(inside) {
            return None;
        }
        trace!(car_id, in_pit = inside, "Pit status changed");
        Some(inside)
    }

    pub fn reset_car(&mut self, car_id: CarId) {
        self.in_pit.remove(&car_id);
    }

    /// Forget every car and the polygon.
    pub fn reset(&mut self) {
        self.in_pit.clear();
        self.polygon = None;
    }
}
