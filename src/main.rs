use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use occupancy::engine::EngineConfig;
use occupancy::model::Snapshot;
use occupancy::refresh::RefreshConfig;
use occupancy::source::{FileSource, SystemClock};
use occupancy::venue::VenueManager;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Every `<venue>.json` in the data directory, sorted.
fn discover_venues(data_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut venues = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            venues.push(stem.to_string());
        }
    }
    venues.sort();
    Ok(venues)
}

/// Log each newly published snapshot for a venue.
fn log_snapshots(venue: String, mut rx: watch::Receiver<Option<Arc<Snapshot>>>) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let Some(snapshot) = rx.borrow_and_update().clone() else {
                continue;
            };
            for c in &snapshot.categories {
                info!(
                    "venue {venue}: {} free={} busy={} ending_soon={} overbooked={}",
                    c.label,
                    c.free,
                    c.busy,
                    c.ending_soon,
                    c.overbooked.len()
                );
            }
            match serde_json::to_string(snapshot.as_ref()) {
                Ok(json) => debug!("venue {venue}: snapshot {json}"),
                Err(e) => warn!("venue {venue}: cannot serialize snapshot: {e}"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("OCCUPANCY_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    occupancy::observability::init(metrics_port)?;

    let data_dir =
        PathBuf::from(std::env::var("OCCUPANCY_DATA_DIR").unwrap_or_else(|_| "./data".into()));
    let refresh_secs: u64 = env_or("OCCUPANCY_REFRESH_SECS", 30);
    let fetch_timeout_secs: u64 = env_or("OCCUPANCY_FETCH_TIMEOUT_SECS", 10);
    let ending_soon_minutes: i64 = env_or("OCCUPANCY_ENDING_SOON_MINUTES", 15);
    let planning_horizon_minutes: i64 = env_or("OCCUPANCY_PLANNING_HORIZON_MINUTES", 60);
    let failure_alert_threshold: u32 = env_or("OCCUPANCY_FAILURE_ALERT_THRESHOLD", 3);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let venues: Vec<String> = match std::env::var("OCCUPANCY_VENUES") {
        Ok(list) => list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => discover_venues(&data_dir)?,
    };
    if venues.is_empty() {
        warn!("no venues configured; add <venue>.json files to {}", data_dir.display());
    }

    let config = RefreshConfig {
        interval: Duration::from_secs(refresh_secs.max(1)),
        fetch_timeout: Duration::from_secs(fetch_timeout_secs.max(1)),
        failure_alert_threshold,
        engine: EngineConfig {
            ending_soon_minutes,
            planning_horizon_minutes: planning_horizon_minutes.max(0),
        },
    };
    let manager = VenueManager::new(
        Arc::new(FileSource::new(data_dir.clone())),
        Arc::new(SystemClock),
        config,
    );

    for venue in &venues {
        match manager.start(venue) {
            Ok(refresher) => log_snapshots(refresher.venue_id().to_string(), refresher.subscribe()),
            Err(e) => warn!("skipping venue {venue:?}: {e}"),
        }
    }

    info!("occupancy running for {} venues", manager.len());
    info!("  data_dir: {}", data_dir.display());
    info!("  refresh: every {refresh_secs}s, fetch timeout {fetch_timeout_secs}s");
    info!("  ending soon: {ending_soon_minutes}m, planning horizon: {planning_horizon_minutes}m");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, stopping refresh loops");
    manager.shutdown().await;
    info!("occupancy stopped");
    Ok(())
}
