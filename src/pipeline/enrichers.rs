//! Enrichers that dispatch telemetry onto the trackers

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{Enricher, Phase};
use crate::Result;
use crate::provider::TrackConfigProvider;
use crate::tracking::{PitStatusTracker, SectorTimingTracker, SpeedTrapTracker};
use crate::types::{
    PitStatusChanged, SectorCrossed, SessionInfoReceived, SimEvent, SpeedTrapFired, TrackConfig,
};

/// Track configuration lookup running beside the pipeline.
///
/// Started on session info, picked up by a later event without waiting. A
/// newer request drops the receiver of an older one, so a stale answer is
/// never applied.
#[derive(Debug, Default)]
struct PendingTrackConfig {
    rx: Option<oneshot::Receiver<Option<TrackConfig>>>,
}

impl PendingTrackConfig {
    fn request(&mut self, provider: &Arc<dyn TrackConfigProvider>, info: &SessionInfoReceived, enricher: &'static str) {
        let (tx, rx) = oneshot::channel();
        self.rx = Some(rx);

        let provider = Arc::clone(provider);
        let track = info.track_name.clone();
        let layout = info.track_config.clone();
        tokio::spawn(async move {
            let config = match provider.track_config(&track, layout.as_deref()).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(enricher, track = %track, error = %e, "Track configuration lookup failed");
                    None
                }
            };
            // The receiver is gone when a newer session superseded this lookup
            let _ = tx.send(config);
        });
    }

    /// The lookup result once it has arrived. `Some(None)` means the track
    /// has no configuration.
    fn take_ready(&mut self) -> Option<Option<TrackConfig>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(config) => {
                self.rx = None;
                Some(config)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                None
            }
        }
    }

    fn cancel(&mut self) {
        self.rx = None;
    }

    fn is_pending(&self) -> bool {
        self.rx.is_some()
    }
}

/// Derives sector splits from spline positions and lap completions.
#[derive(Debug, Default)]
pub struct SectorTimingEnricher {
    tracker: SectorTimingTracker,
}

impl SectorTimingEnricher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Enricher for SectorTimingEnricher {
    fn name(&self) -> &'static str {
        "sector_timing"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    async fn enrich(&mut self, event: &SimEvent) -> Result<Vec<SimEvent>> {
        let derived = match event {
            SimEvent::SessionInfoReceived(_) | SimEvent::SessionEnded(_) => {
                self.tracker.reset();
                None
            }
            SimEvent::DriverDisconnected(driver) => {
                self.tracker.reset_car(driver.car_id);
                None
            }
            SimEvent::TelemetryUpdated(t) => self
                .tracker
                .on_telemetry(t.car_id, t.spline_position, Instant::now())
                .map(|split| SectorCrossed {
                    car_id: t.car_id,
                    sector_index: split.sector_index,
                    sector_time_ms: split.sector_time_ms,
                    completed_sectors: split.completed_sectors,
                    is_valid_lap: false,
                }),
            SimEvent::LapCompleted(lap) => self
                .tracker
                .on_lap_completed(lap.car_id, lap.lap_time_ms)
                .map(|sectors| SectorCrossed {
                    car_id: lap.car_id,
                    sector_index: 2,
                    sector_time_ms: sectors[2],
                    completed_sectors: sectors.to_vec(),
                    is_valid_lap: lap.cuts == 0,
                }),
            SimEvent::DriverConnected(_)
            | SimEvent::CarInfoReceived(_)
            | SimEvent::SectorCrossed(_)
            | SimEvent::PitStatusChanged(_)
            | SimEvent::SpeedTrapFired(_)
            | SimEvent::CollisionDetected(_) => None,
        };
        Ok(derived.map(SimEvent::SectorCrossed).into_iter().collect())
    }
}

/// Reports pit corridor entry and exit.
pub struct PitStatusEnricher {
    provider: Arc<dyn TrackConfigProvider>,
    tracker: PitStatusTracker,
    pending: PendingTrackConfig,
}

impl PitStatusEnricher {
    pub fn new(provider: Arc<dyn TrackConfigProvider>) -> Self {
        Self { provider, tracker: PitStatusTracker::new(), pending: PendingTrackConfig::default() }
    }

    fn apply_pending(&mut self) {
        if let Some(config) = self.pending.take_ready() {
            match config.and_then(|c| c.pit_lane) {
                Some(pit_lane) => {
                    info!(points = pit_lane.center_line.len(), "Pit lane loaded");
                    self.tracker.set_polygon(pit_lane.to_polygon());
                }
                None => debug!("No pit lane configured for this track"),
            }
        }
    }
}

#[async_trait::async_trait]
impl Enricher for PitStatusEnricher {
    fn name(&self) -> &'static str {
        "pit_status"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    async fn enrich(&mut self, event: &SimEvent) -> Result<Vec<SimEvent>> {
        self.apply_pending();
        let derived = match event {
            SimEvent::SessionInfoReceived(info) => {
                self.tracker.reset();
                self.pending.request(&self.provider, info, "pit_status");
                None
            }
            SimEvent::SessionEnded(_) => {
                self.tracker.reset();
                self.pending.cancel();
                None
            }
            SimEvent::DriverDisconnected(driver) => {
                self.tracker.reset_car(driver.car_id);
                None
            }
            SimEvent::TelemetryUpdated(t) => self
                .tracker
                .on_telemetry(t.car_id, t.world_x, t.world_z)
                .map(|is_in_pit| PitStatusChanged { car_id: t.car_id, is_in_pit }),
            SimEvent::DriverConnected(_)
            | SimEvent::CarInfoReceived(_)
            | SimEvent::LapCompleted(_)
            | SimEvent::SectorCrossed(_)
            | SimEvent::PitStatusChanged(_)
            | SimEvent::SpeedTrapFired(_)
            | SimEvent::CollisionDetected(_) => None,
        };
        Ok(derived.map(SimEvent::PitStatusChanged).into_iter().collect())
    }
}

/// Reports speed trap crossings.
pub struct SpeedTrapEnricher {
    provider: Arc<dyn TrackConfigProvider>,
    tracker: SpeedTrapTracker,
    pending: PendingTrackConfig,
}

impl SpeedTrapEnricher {
    pub fn new(provider: Arc<dyn TrackConfigProvider>) -> Self {
        Self { provider, tracker: SpeedTrapTracker::new(), pending: PendingTrackConfig::default() }
    }

    fn apply_pending(&mut self) {
        if let Some(config) = self.pending.take_ready() {
            let traps = config.map(|c| c.speed_traps).unwrap_or_default();
            info!(traps = traps.len(), "Speed traps loaded");
            self.tracker.set_traps(traps);
        }
    }

    /// Whether a track configuration lookup is still outstanding.
    pub fn is_loading(&self) -> bool {
        self.pending.is_pending()
    }
}

#[async_trait::async_trait]
impl Enricher for SpeedTrapEnricher {
    fn name(&self) -> &'static str {
        "speed_trap"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    async fn enrich(&mut self, event: &SimEvent) -> Result<Vec<SimEvent>> {
        self.apply_pending();
        let derived = match event {
            SimEvent::SessionInfoReceived(info) => {
                self.tracker.reset();
                self.pending.request(&self.provider, info, "speed_trap");
                None
            }
            SimEvent::SessionEnded(_) => {
                self.tracker.reset();
                self.pending.cancel();
                None
            }
            SimEvent::DriverDisconnected(driver) => {
                self.tracker.reset_car(driver.car_id);
                None
            }
            SimEvent::TelemetryUpdated(t) => self
                .tracker
                .on_telemetry(t.car_id, t.world_x, t.world_z, t.speed_kmh)
                .map(|crossing| SpeedTrapFired {
                    car_id: t.car_id,
                    trap_id: crossing.trap.id,
                    trap_name: crossing.trap.name,
                    speed_kmh: crossing.speed_kmh,
                }),
            SimEvent::DriverConnected(_)
            | SimEvent::CarInfoReceived(_)
            | SimEvent::LapCompleted(_)
            | SimEvent::SectorCrossed(_)
            | SimEvent::PitStatusChanged(_)
            | SimEvent::SpeedTrapFired(_)
            | SimEvent::CollisionDetected(_) => None,
        };
        Ok(derived.map(SimEvent::SpeedTrapFired).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NoTrackConfig, StaticTrackConfigs};
    use crate::test_utils::{lap, session_info, settle, telemetry, telemetry_at};
    use crate::types::{PitLaneDefinition, SpeedTrapDefinition, WorldPoint};

    fn tracks() -> Arc<dyn TrackConfigProvider> {
        let mut tracks = StaticTrackConfigs::new();
        tracks.insert(
            "ks_test",
            None,
            TrackConfig {
                pit_lane: Some(PitLaneDefinition::new(
                    vec![WorldPoint::new(0.0, 0.0), WorldPoint::new(100.0, 0.0)],
                    8.0,
                )),
                speed_traps: vec![SpeedTrapDefinition::new(
                    "Finish",
                    WorldPoint::new(50.0, -20.0),
                    WorldPoint::new(50.0, 20.0),
                )],
            },
        );
        Arc::new(tracks)
    }

    #[tokio::test]
    async fn sector_enricher_emits_splits_and_final_sector() {
        let mut enricher = SectorTimingEnricher::new();
        let mut splits = Vec::new();
        for i in 0..=60 {
            splits.extend(enricher.enrich(&telemetry(3, i as f32 / 60.0 * 0.9)).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert_eq!(splits.len(), 2);

        let last = enricher.enrich(&lap(3, 95_000, 0)).await.unwrap();
        match last.as_slice() {
            [SimEvent::SectorCrossed(s)] => {
                assert_eq!(s.sector_index, 2);
                assert!(s.is_valid_lap);
                assert_eq!(s.completed_sectors.iter().sum::<u32>(), 95_000);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn cut_laps_are_not_valid() {
        let mut enricher = SectorTimingEnricher::new();
        for i in 0..=60 {
            enricher.enrich(&telemetry(3, i as f32 / 60.0 * 0.9)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let last = enricher.enrich(&lap(3, 95_000, 2)).await.unwrap();
        assert!(matches!(last.as_slice(), [SimEvent::SectorCrossed(s)] if !s.is_valid_lap));
    }

    #[tokio::test]
    async fn pit_enricher_loads_corridor_after_session_start() {
        let mut enricher = PitStatusEnricher::new(tracks());
        enricher.enrich(&session_info("ks_test")).await.unwrap();
        settle().await;

        let first = enricher.enrich(&telemetry_at(1, 0.1, -50.0, 40.0, 120.0)).await.unwrap();
        assert_eq!(first, vec![SimEvent::PitStatusChanged(PitStatusChanged { car_id: 1, is_in_pit: false })]);
        let entered = enricher.enrich(&telemetry_at(1, 0.1, 10.0, 0.0, 60.0)).await.unwrap();
        assert_eq!(entered, vec![SimEvent::PitStatusChanged(PitStatusChanged { car_id: 1, is_in_pit: true })]);
        assert!(enricher.enrich(&telemetry_at(1, 0.1, 20.0, 1.0, 60.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pit_enricher_is_inert_for_unknown_tracks() {
        let mut enricher = PitStatusEnricher::new(Arc::new(NoTrackConfig));
        enricher.enrich(&session_info("unknown")).await.unwrap();
        settle().await;
        assert!(enricher.enrich(&telemetry_at(1, 0.1, 10.0, 0.0, 60.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_end_clears_the_corridor() {
        let mut enricher = PitStatusEnricher::new(tracks());
        enricher.enrich(&session_info("ks_test")).await.unwrap();
        settle().await;
        enricher.enrich(&telemetry_at(1, 0.1, 10.0, 0.0, 60.0)).await.unwrap();
        enricher.enrich(&SimEvent::SessionEnded(crate::types::SessionEnded)).await.unwrap();
        assert!(enricher.enrich(&telemetry_at(1, 0.1, 10.0, 50.0, 60.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn speed_trap_enricher_fires_on_crossing() {
        let mut enricher = SpeedTrapEnricher::new(tracks());
        enricher.enrich(&session_info("ks_test")).await.unwrap();
        settle().await;

        assert!(enricher.enrich(&telemetry_at(2, 0.5, 40.0, 30.0, 250.0)).await.unwrap().is_empty());
        assert!(!enricher.is_loading());
        let fired = enricher.enrich(&telemetry_at(2, 0.5, 60.0, 30.0, 262.0)).await.unwrap();
        assert!(fired.is_empty(), "crossing beyond the trap's end");
        assert!(enricher.enrich(&telemetry_at(2, 0.5, 40.0, 35.0, 250.0)).await.unwrap().is_empty());
        assert!(enricher.enrich(&telemetry_at(2, 0.5, 40.0, 0.0, 255.0)).await.unwrap().is_empty());
        let fired = enricher.enrich(&telemetry_at(2, 0.5, 60.0, 0.0, 264.5)).await.unwrap();
        match fired.as_slice() {
            [SimEvent::SpeedTrapFired(f)] => {
                assert_eq!(f.trap_name, "Finish");
                assert_eq!(f.speed_kmh, 264.5);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn newer_session_discards_older_lookup() {
        let mut enricher = SpeedTrapEnricher::new(tracks());
        enricher.enrich(&session_info("ks_test")).await.unwrap();
        enricher.enrich(&session_info("unknown")).await.unwrap();
        settle().await;

        enricher.enrich(&telemetry_at(2, 0.5, 40.0, 0.0, 250.0)).await.unwrap();
        let fired = enricher.enrich(&telemetry_at(2, 0.5, 60.0, 0.0, 250.0)).await.unwrap();
        assert!(fired.is_empty());
    }
}
