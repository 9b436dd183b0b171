//! Live timing console
//!
//! Listens for a dedicated server's UDP plugin traffic and prints the
//! leaderboard once per second.
//!
//! ```text
//! cargo run --example live_timing -- [paddock.yaml] [tracks.yaml]
//! ```
//!
//! Point the server's `UDP_PLUGIN_ADDRESS` at this machine's `listen_port`
//! (9996 by default). Set `RUST_LOG=paddock=debug` for per-packet logs.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use paddock::provider::{NoTrackConfig, StaticTrackConfigs};
use paddock::{LiveTimingSnapshot, Paddock, ServerConfig, TrackConfigProvider};
use tracing_subscriber::EnvFilter;

fn format_lap(ms: Option<u32>) -> String {
    match ms {
        Some(ms) => format!("{}:{:02}.{:03}", ms / 60_000, (ms / 1000) % 60, ms % 1000),
        None => "-:--.---".to_string(),
    }
}

fn print_snapshot(snapshot: &LiveTimingSnapshot) {
    println!(
        "\n{} | {} | {} | feed entries: {}",
        snapshot.info.server_name, snapshot.info.track_name, snapshot.info.session_type, snapshot.feed_len
    );
    println!("{:>3} {:>4} {:<24} {:>10} {:>10} {:>5} {:>7}", "Pos", "Car", "Driver", "Best", "Last", "Laps", "Vmax");
    for driver in &snapshot.leaderboard {
        println!(
            "{:>3} {:>4} {:<24} {:>10} {:>10} {:>5} {:>7.1}{}",
            driver.position.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            driver.car_id,
            driver.driver_name,
            format_lap(driver.best_lap_time_ms),
            format_lap(driver.last_lap_time_ms),
            driver.total_laps,
            driver.max_speed_kmh,
            if driver.is_in_pit { "  PIT" } else { "" },
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paddock=info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let tracks: Arc<dyn TrackConfigProvider> = match args.next() {
        Some(path) => Arc::new(StaticTrackConfigs::load(path)?),
        None => Arc::new(NoTrackConfig),
    };

    let mut handle = Paddock::start(&config, tracks).await?;
    // No durable writer in this demo
    drop(handle.take_persistence());

    let live_timing = handle.live_timing();
    let mut snapshots = Box::pin(live_timing.snapshots(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = snapshots.next() => match snapshot {
                Some(Some(snapshot)) => print_snapshot(&snapshot),
                Some(None) => println!("Waiting for a session..."),
                None => break,
            },
        }
    }

    let stats = handle.shutdown().await?;
    println!("Processed {} events ({} derived)", stats.processed, stats.derived);
    Ok(())
}
