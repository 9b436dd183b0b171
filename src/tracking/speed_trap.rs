//! Speed trap line crossings

use std::collections::HashMap;

use tracing::trace;

use super::geometry::segments_intersect;
use crate::types::{CarId, SpeedTrapDefinition, WorldPoint};

/// A car crossed a trap during one update.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapCrossing {
    pub trap: SpeedTrapDefinition,
    pub speed_kmh: f32,
}

/// Detects movement segments that cross a configured trap line.
#[derive(Debug, Default)]
pub struct SpeedTrapTracker {
    traps: Vec<SpeedTrapDefinition>,
    last_position: HashMap<CarId, WorldPoint>,
}

impl SpeedTrapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_traps(&mut self, traps: Vec<SpeedTrapDefinition>) {
        self.traps = traps;
        self.last_position.clear();
    }

    pub fn traps(&self) -> &[SpeedTrapDefinition] {
        &self.traps
    }

    /// Test the move from the car's previous position to `(x, z)` against each
    /// trap in order. At most one trap fires per update.
    pub fn on_telemetry(&mut self, car_id: CarId, x: f32, z: f32, speed_kmh: f32) -> Option<TrapCrossing> {
        let current = WorldPoint::new(x, z);
        let previous = self.last_position.insert(car_id, current)?;

        let trap = self
            .traps
            .iter()
            .find(|trap| segments_intersect(previous, current, trap.point1, trap.point2))?;

        trace!(car_id, trap = %trap.name, speed_kmh, "Speed trap crossed");
        Some(TrapCrossing { trap: trap.clone(), speed_kmh })
    }

    pub fn reset_car(&mut self, car_id: CarId) {
        self.last_position.remove(&car_id);
    }

    /// Forget every car and the trap list.
    pub fn reset(&mut self) {
        self.last_position.clear();
        self.traps.clear();
    }
}
