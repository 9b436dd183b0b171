//! Track configuration providers

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::types::TrackConfig;
use crate::{Result, TimingError};

/// Source of per-track points of interest.
///
/// Queried once per session start, off the telemetry path. Implementations
/// may do I/O; the enrichers never wait on the result.
#[async_trait::async_trait]
pub trait TrackConfigProvider: Send + Sync + 'static {
    /// Look up a track layout.
    ///
    /// Returns:
    /// - `Ok(Some(config))` - Pit lane and/or speed traps are configured
    /// - `Ok(None)` - Nothing is known about this track
    /// - `Err(e)` - The lookup itself failed
    async fn track_config(&self, track: &str, config: Option<&str>) -> Result<Option<TrackConfig>>;
}

/// Provider for tracks without any configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrackConfig;

#[async_trait::async_trait]
impl TrackConfigProvider for NoTrackConfig {
    async fn track_config(&self, _track: &str, _config: Option<&str>) -> Result<Option<TrackConfig>> {
        Ok(None)
    }
}

/// In-memory track table, usually loaded from YAML.
///
/// Layout-specific entries are keyed `track/layout`; a bare `track` entry is
/// the fallback for every layout of that track.
///
/// ```rust
/// use paddock::provider::StaticTrackConfigs;
///
/// let tracks = StaticTrackConfigs::from_yaml_str(r#"
/// ks_spa:
///   speed_traps:
///     - name: Kemmel
///       point1: { x: 10.0, z: -5.0 }
///       point2: { x: 10.0, z: 5.0 }
/// "#).unwrap();
/// assert_eq!(tracks.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTrackConfigs {
    tracks: HashMap<String, TrackConfig>,
}

impl StaticTrackConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: &str, layout: Option<&str>, config: TrackConfig) {
        self.tracks.insert(Self::key(track, layout), config);
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let tracks: HashMap<String, TrackConfig> = serde_yaml_ng::from_str(yaml)?;
        for (key, config) in &tracks {
            if let Some(pit) = &config.pit_lane
                && pit.center_line.len() < 2
            {
                return Err(TimingError::config(format!(
                    "pit lane for '{}' needs at least two centre line points",
                    key
                )));
            }
        }
        info!(tracks = tracks.len(), "Loaded track configurations");
        Ok(Self { tracks })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TimingError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn key(track: &str, layout: Option<&str>) -> String {
        match layout {
            Some(layout) if !layout.is_empty() => format!("{}/{}", track, layout),
            _ => track.to_string(),
        }
    }

    fn lookup(&self, track: &str, layout: Option<&str>) -> Option<&TrackConfig> {
        self.tracks.get(&Self::key(track, layout)).or_else(|| self.tracks.get(track))
    }
}

#[async_trait::async_trait]
impl TrackConfigProvider for StaticTrackConfigs {
    async fn track_config(&self, track: &str, config: Option<&str>) -> Result<Option<TrackConfig>> {
        let found = self.lookup(track, config).cloned();
        debug!(track, layout = ?config, found = found.is_some(), "Track configuration lookup");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKS: &str = r#"
ks_spa:
  pit_lane:
    center_line: [{ x: 0.0, z: 0.0 }, { x: 100.0, z: 0.0 }]
ks_nordschleife/touristenfahrten:
  speed_traps:
    - name: Döttinger Höhe
      point1: { x: 0.0, z: -8.0 }
      point2: { x: 0.0, z: 8.0 }
"#;

    #[tokio::test]
    async fn layout_falls_back_to_bare_track() {
        let tracks = StaticTrackConfigs::from_yaml_str(TRACKS).unwrap();
        let spa = tracks.track_config("ks_spa", Some("gp")).await.unwrap();
        assert!(spa.unwrap().pit_lane.is_some());
    }

    #[tokio::test]
    async fn layout_specific_entries_need_the_layout() {
        let tracks = StaticTrackConfigs::from_yaml_str(TRACKS).unwrap();
        let tf = tracks.track_config("ks_nordschleife", Some("touristenfahrten")).await.unwrap();
        assert_eq!(tf.unwrap().speed_traps[0].name, "Döttinger Höhe");
        assert!(tracks.track_config("ks_nordschleife", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_track_config_knows_nothing() {
        assert!(NoTrackConfig.track_config("ks_spa", None).await.unwrap().is_none());
    }

    #[test]
    fn single_point_pit_lane_is_rejected() {
        let yaml = "x:\n  pit_lane:\n    center_line: [{ x: 0.0, z: 0.0 }]";
        assert!(matches!(StaticTrackConfigs::from_yaml_str(yaml), Err(TimingError::Config { .. })));
    }
}
