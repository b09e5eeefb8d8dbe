use std::net::SocketAddr;

// ── Refresh loop ────────────────────────────────────────────────

/// Counter: refresh ticks. Labels: status (published, unchanged, skipped, failed).
pub const TICKS_TOTAL: &str = "occupancy_ticks_total";

/// Histogram: fetch + recompute duration in seconds.
pub const TICK_DURATION_SECONDS: &str = "occupancy_tick_duration_seconds";

/// Gauge: consecutive failed ticks. Labels: venue.
pub const CONSECUTIVE_FAILURES: &str = "occupancy_consecutive_failures";

// ── Data quality ────────────────────────────────────────────────

/// Counter: reservation records left out of a snapshot. Labels: reason.
pub const RECORDS_SKIPPED_TOTAL: &str = "occupancy_records_skipped_total";

/// Gauge: demands that found no unit in the last snapshot. Labels: venue.
pub const OVERFLOW_DEMANDS: &str = "occupancy_overflow_demands";

// ── Venues and gate ─────────────────────────────────────────────

/// Gauge: registered venues.
pub const VENUES_ACTIVE: &str = "occupancy_venues_active";

/// Counter: capacity checks answered. Labels: allowed.
pub const CAPACITY_CHECKS_TOTAL: &str = "occupancy_capacity_checks_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
