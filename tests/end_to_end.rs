//! End-to-end replays through the public API
//!
//! Encoded datagrams go through the replay source, the enrichment pipeline and
//! both buses, and the outcome is checked on the live timing state and the
//! persistence feed.

use std::sync::Arc;
use std::time::Duration;

use paddock::protocol::{CarUpdatePacket, ConnectionPacket, LapCompletedPacket, Packet, SessionInfoPacket, Vector3};
use paddock::provider::{NoTrackConfig, StaticTrackConfigs};
use paddock::session::FeedEvent;
use paddock::{
    EventKind, EventSource, Paddock, PersistenceReceiver, ReplaySource, ServerConfig, SimEvent, TimingError,
};

fn session_info(track: &str) -> Packet {
    Packet::SessionInfo(SessionInfoPacket {
        new_session: true,
        protocol_version: 4,
        session_index: 0,
        current_session_index: 0,
        session_count: 1,
        server_name: "Integration".to_string(),
        track: track.to_string(),
        track_config: String::new(),
        name: "Practice".to_string(),
        session_type: 1,
        time_min: 30,
        laps: 0,
        wait_time: 0,
        ambient_temp: 20,
        road_temp: 26,
        weather_graphics: "3_clear".to_string(),
        elapsed_ms: 0,
    })
}

fn new_connection(car_id: u8, name: &str) -> Packet {
    Packet::NewConnection(ConnectionPacket {
        driver_name: name.to_string(),
        driver_guid: format!("7656119{:010}", car_id),
        car_id,
        car_model: "ks_porsche_911_gt3_r_2016".to_string(),
        car_skin: "00_official".to_string(),
    })
}

fn car_update(car_id: u8, spline_position: f32, x: f32, z: f32, speed_kmh: f32) -> Packet {
    Packet::CarUpdate(CarUpdatePacket {
        car_id,
        position: Vector3 { x, y: 0.0, z },
        velocity: Vector3 { x: speed_kmh / 3.6, y: 0.0, z: 0.0 },
        gear: 4,
        engine_rpm: 6800,
        spline_position,
    })
}

fn lap_completed(car_id: u8, lap_time_ms: u32, cuts: u8) -> Packet {
    Packet::LapCompleted(LapCompletedPacket {
        car_id,
        lap_time_ms,
        cuts,
        leaderboard: Vec::new(),
        grip_level: 100,
    })
}

async fn drain(mut persistence: PersistenceReceiver) -> Vec<SimEvent> {
    let mut events = Vec::new();
    while let Some(event) = persistence.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn lap_scenario_produces_sectors_and_best_lap() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut datagrams = vec![session_info("ks_spa").encode(), new_connection(3, "Carol").encode()];
    for i in 0..50 {
        let spline = 0.30 + 0.40 * i as f32 / 49.0;
        datagrams.push(car_update(3, spline, 0.0, 0.0, 180.0).encode());
    }
    datagrams.push(lap_completed(3, 95_000, 0).encode());

    let mut handle = Paddock::replay(datagrams, Arc::new(NoTrackConfig), &ServerConfig::default());
    let live_timing = handle.live_timing();
    let persistence = handle.take_persistence().expect("persistence receiver");

    let stats = handle.wait().await?;
    assert_eq!(stats.processed, 53);
    assert_eq!(stats.enricher_failures, 0);

    let events = drain(persistence).await;
    let sectors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SimEvent::SectorCrossed(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(sectors.len(), 3);
    assert_eq!(sectors[0].sector_index, 0);
    assert_eq!(sectors[1].sector_index, 1);
    assert!(sectors[..2].iter().all(|s| s.sector_time_ms > 0));

    let split = sectors[2];
    assert_eq!(split.sector_index, 2);
    assert_eq!(split.completed_sectors.len(), 3);
    assert_eq!(split.completed_sectors.iter().sum::<u32>(), 95_000);
    assert!(split.is_valid_lap);

    // The final split is published before the lap it was derived from
    let kinds: Vec<_> = events.iter().map(SimEvent::kind).collect();
    assert_eq!(kinds[0], EventKind::SessionInfoReceived);
    assert_eq!(kinds[1], EventKind::DriverConnected);
    assert_eq!(&kinds[kinds.len() - 2..], &[EventKind::SectorCrossed, EventKind::LapCompleted]);

    let session = live_timing.current_session().expect("session still open");
    let driver = session.driver(3).expect("car 3 registered");
    assert_eq!(driver.best_lap_time_ms, Some(95_000));
    assert_eq!(driver.total_laps, 1);
    assert_eq!(driver.best_sector_times_ms, split.completed_sectors);
    assert_eq!(session.best_laps().len(), 1);
    Ok(())
}

#[tokio::test]
async fn pit_lane_and_speed_trap_from_track_config() -> anyhow::Result<()> {
    let tracks = StaticTrackConfigs::from_yaml_str(
        r#"
ks_test:
  pit_lane:
    center_line:
      - { x: 0.0, z: 0.0 }
      - { x: 100.0, z: 0.0 }
    half_width_m: 8.0
  speed_traps:
    - name: Back Straight
      point1: { x: 500.0, z: -20.0 }
      point2: { x: 500.0, z: 20.0 }
"#,
    )?;

    let packets = vec![
        session_info("ks_test"),
        new_connection(1, "Alice"),
        car_update(1, 0.1, -50.0, 40.0, 60.0),
        car_update(1, 0.1, 10.0, 0.0, 60.0),
        car_update(1, 0.1, 490.0, 0.0, 200.0),
        car_update(1, 0.1, 510.0, 0.0, 250.0),
    ];
    // Pacing gives the track lookup time to land before the telemetry
    let source = ReplaySource::from_packets(packets).with_pacing(Duration::from_millis(5));
    let mut handle = Paddock::run(source, Arc::new(tracks), &ServerConfig::default());
    let live_timing = handle.live_timing();
    let persistence = handle.take_persistence().expect("persistence receiver");
    handle.wait().await?;

    let events = drain(persistence).await;
    let entered = events
        .iter()
        .filter(|e| matches!(e, SimEvent::PitStatusChanged(p) if p.is_in_pit))
        .count();
    assert_eq!(entered, 1);

    let traps: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SimEvent::SpeedTrapFired(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(traps.len(), 1);
    assert_eq!(traps[0].trap_name, "Back Straight");
    assert!((traps[0].speed_kmh - 250.0).abs() < 0.01);

    let driver = live_timing.driver(1).expect("car 1 registered");
    assert!(!driver.is_in_pit);
    assert!(driver.is_in_out_lap);
    assert!((driver.max_speed_kmh - 250.0).abs() < 0.01);

    let feed = live_timing.feed_events();
    assert!(feed.iter().any(|f| matches!(f, FeedEvent::DriverInPit { car_id: 1, .. })));
    assert!(feed.iter().any(|f| matches!(f, FeedEvent::MaxSpeed { car_id: 1, .. })));
    Ok(())
}

#[tokio::test]
async fn malformed_datagrams_do_not_stop_the_replay() {
    let datagrams = vec![
        session_info("ks_spa").encode(),
        vec![53, 1, 2, 3],
        Vec::new(),
        new_connection(2, "Bob").encode(),
        vec![56, 4],
    ];
    let mut handle = Paddock::replay(datagrams, Arc::new(NoTrackConfig), &ServerConfig::default());
    let live_timing = handle.live_timing();
    drop(handle.take_persistence());

    let stats = handle.wait().await.expect("replay completes");
    assert_eq!(stats.processed, 2);
    assert_eq!(live_timing.leaderboard().len(), 1);
}

#[tokio::test]
async fn shutdown_stops_a_paced_replay() {
    let packets = (0..1000).map(|i| car_update(1, i as f32 / 1000.0, 0.0, 0.0, 100.0));
    let source = ReplaySource::from_packets(packets).with_pacing(Duration::from_millis(50));
    let handle = Paddock::run(source, Arc::new(NoTrackConfig), &ServerConfig::default());

    let stats = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown completes")
        .expect("no task failed");
    assert!(stats.processed < 1000);
}

#[tokio::test]
async fn waiting_on_a_replay_does_not_need_a_persistence_reader() {
    let config = ServerConfig { persistence_bus_capacity: 4, ..ServerConfig::default() };
    let datagrams = (0..20).map(|_| vec![55]);
    let handle = Paddock::replay(datagrams, Arc::new(NoTrackConfig), &config);

    let stats = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("wait completes with the persistence receiver untaken")
        .expect("no task failed");
    assert_eq!(stats.processed, 20);
}

/// Fails on the first receive, then would keep handing out packets.
struct BrokenSocket {
    failed: bool,
}

#[async_trait::async_trait]
impl EventSource for BrokenSocket {
    async fn next_packet(&mut self) -> paddock::Result<Option<Packet>> {
        if !self.failed {
            self.failed = true;
            return Err(TimingError::io("receiving datagram", std::io::Error::other("connection reset")));
        }
        Ok(Some(session_info("ks_spa")))
    }

    fn name(&self) -> &'static str {
        "broken-socket"
    }
}

#[tokio::test]
async fn receive_failure_reaches_the_caller() {
    let mut handle = Paddock::run(BrokenSocket { failed: false }, Arc::new(NoTrackConfig), &ServerConfig::default());
    let live_timing = handle.live_timing();
    let persistence = handle.take_persistence().expect("persistence receiver");

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("tasks stop after the failure");
    match result {
        Err(TimingError::Io { operation, .. }) => assert_eq!(operation, "receiving datagram"),
        other => panic!("expected the receive error, got {other:?}"),
    }

    // The source stopped at the failure
    assert!(drain(persistence).await.is_empty());
    assert!(live_timing.current_session().is_none());
}
