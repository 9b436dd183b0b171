//! Track points of interest: pit lane corridors and speed traps

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracking::geometry;

/// A point in world space, metres. X is left/right, Z is forward/back.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f32,
    pub z: f32,
}

impl WorldPoint {
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }
}

/// Pit lane as a centre line plus a half-width.
///
/// The detection polygon is derived on demand by [`PitLaneDefinition::to_polygon`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitLaneDefinition {
    /// Ordered points along the centre of the pit lane
    pub center_line: Vec<WorldPoint>,
    /// Half-width of the corridor in metres (8 gives a 16 m wide lane)
    #[serde(default = "default_half_width")]
    pub half_width_m: f32,
}

fn default_half_width() -> f32 {
    8.0
}

impl PitLaneDefinition {
    pub fn new(center_line: Vec<WorldPoint>, half_width_m: f32) -> Self {
        Self { center_line, half_width_m }
    }

    /// Expand the centre line into a closed corridor polygon.
    ///
    /// Returns an empty polygon when the centre line has fewer than two points.
    pub fn to_polygon(&self) -> Vec<WorldPoint> {
        geometry::corridor_polygon(&self.center_line, self.half_width_m)
    }
}

/// Speed measurement line across the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTrapDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Display name, e.g. "Kemmel Straight"
    pub name: String,
    pub point1: WorldPoint,
    pub point2: WorldPoint,
}

impl SpeedTrapDefinition {
    pub fn new(name: impl Into<String>, point1: WorldPoint, point2: WorldPoint) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), point1, point2 }
    }
}

/// Points of interest configured for one track layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackConfig {
    #[serde(default)]
    pub pit_lane: Option<PitLaneDefinition>,
    #[serde(default)]
    pub speed_traps: Vec<SpeedTrapDefinition>,
}

/// Strip path prefixes that launchers add to track names.
///
/// Content Manager reports tracks such as `csp/7/00/:/preset/ks_spa` or
/// `\cm_0\config\ks_spa`; only the last segment names the track.
pub fn sanitize_track_name(track_name: &str) -> &str {
    if track_name.trim().is_empty() {
        return track_name;
    }
    match track_name.rfind(['/', '\\']) {
        Some(idx) if idx + 1 < track_name.len() => &track_name[idx + 1..],
        _ => track_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_launcher_paths() {
        assert_eq!(sanitize_track_name("csp/7/00/:/asdf/simulator"), "simulator");
        assert_eq!(sanitize_track_name("\\cm_0\\config\\00\\preset\\ks_silverstone"), "ks_silverstone");
        assert_eq!(sanitize_track_name("ks_spa"), "ks_spa");
        assert_eq!(sanitize_track_name("trailing/"), "trailing/");
        assert_eq!(sanitize_track_name(""), "");
    }

    #[test]
    fn track_config_parses_from_yaml() {
        let yaml = r#"
pit_lane:
  center_line:
    - { x: 0.0, z: 0.0 }
    - { x: 100.0, z: 0.0 }
  half_width_m: 6.0
speed_traps:
  - name: Main Straight
    point1: { x: 50.0, z: -10.0 }
    point2: { x: 50.0, z: 10.0 }
"#;
        let config: TrackConfig = serde_yaml_ng::from_str(yaml).unwrap();
        let pit = config.pit_lane.expect("pit lane configured");
        assert_eq!(pit.center_line.len(), 2);
        assert_eq!(pit.half_width_m, 6.0);
        assert_eq!(config.speed_traps[0].name, "Main Straight");
        assert_eq!(pit.to_polygon().len(), 4);
    }

    #[test]
    fn missing_half_width_uses_default() {
        let yaml = "center_line: [{ x: 0.0, z: 0.0 }, { x: 1.0, z: 0.0 }]";
        let pit: PitLaneDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(pit.half_width_m, 8.0);
    }
}
