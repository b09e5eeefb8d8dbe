use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{check_capacity, compute_snapshot, EngineConfig, EngineError};
use crate::model::*;
use crate::observability::*;
use crate::source::{Clock, ReservationSource, SourceError};

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    /// A fetch taking longer than this fails the tick.
    pub fetch_timeout: Duration,
    /// Consecutive failures after which failures are logged as errors.
    pub failure_alert_threshold: u32,
    pub engine: EngineConfig,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            failure_alert_threshold: 3,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum RefreshError {
    Source(SourceError),
    Engine(EngineError),
    /// No tick has succeeded yet.
    NoSnapshot,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Source(e) => write!(f, "fetch failed: {e}"),
            RefreshError::Engine(e) => write!(f, "{e}"),
            RefreshError::NoSnapshot => write!(f, "no snapshot published yet"),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<SourceError> for RefreshError {
    fn from(e: SourceError) -> Self {
        RefreshError::Source(e)
    }
}

impl From<EngineError> for RefreshError {
    fn from(e: EngineError) -> Self {
        RefreshError::Engine(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new snapshot replaced the previous one.
    Published,
    /// Recomputed snapshot equals the published one; readers not woken.
    Unchanged,
    /// Another tick was still running.
    Skipped,
    /// Fetch or computation failed; the previous snapshot stays published.
    Failed,
}

impl TickOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TickOutcome::Published => "published",
            TickOutcome::Unchanged => "unchanged",
            TickOutcome::Skipped => "skipped",
            TickOutcome::Failed => "failed",
        }
    }
}

/// Clears the in-flight flag when a tick finishes or is dropped mid-way.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Recomputes one venue's snapshot on demand or on a timer and publishes it.
///
/// Single writer (the tick), any number of readers. Readers get an
/// `Arc<Snapshot>` and never hold a lock the tick needs.
pub struct Refresher {
    venue_id: String,
    source: Arc<dyn ReservationSource>,
    clock: Arc<dyn Clock>,
    config: RefreshConfig,
    published: watch::Sender<Option<Arc<Snapshot>>>,
    in_flight: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl Refresher {
    pub fn new(
        venue_id: String,
        source: Arc<dyn ReservationSource>,
        clock: Arc<dyn Clock>,
        config: RefreshConfig,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            venue_id,
            source,
            clock,
            config,
            published,
            in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published.borrow().clone()
    }

    /// Receiver woken whenever a changed snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.published.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn is_ticking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch, recompute, publish. Never runs concurrently with itself.
    pub async fn tick(&self) -> TickOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("venue {}: previous tick still running, skipping", self.venue_id);
            metrics::counter!(TICKS_TOTAL, "status" => TickOutcome::Skipped.as_str()).increment(1);
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        let started = Instant::now();
        let outcome = match self.recompute().await {
            Ok(snapshot) => self.publish(snapshot),
            Err(e) => self.record_failure(e),
        };
        metrics::histogram!(TICK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        metrics::counter!(TICKS_TOTAL, "status" => outcome.as_str()).increment(1);
        outcome
    }

    async fn fetch(&self) -> Result<VenueData, SourceError> {
        let timeout = self.config.fetch_timeout;
        tokio::time::timeout(timeout, self.source.fetch(&self.venue_id))
            .await
            .map_err(|_| SourceError::Timeout(timeout))?
    }

    async fn recompute(&self) -> Result<Snapshot, RefreshError> {
        let data = self.fetch().await?;
        let now = self.clock.now();
        Ok(compute_snapshot(&data, now, &self.config.engine)?)
    }

    fn publish(&self, snapshot: Snapshot) -> TickOutcome {
        let recovered = self.consecutive_failures.swap(0, Ordering::AcqRel);
        if recovered > 0 {
            info!("venue {}: refresh recovered after {recovered} failures", self.venue_id);
        }
        metrics::gauge!(CONSECUTIVE_FAILURES, "venue" => self.venue_id.clone()).set(0.0);
        self.record_diagnostics(&snapshot.diagnostics);

        let changed = self.published.send_if_modified(|current| {
            if current.as_deref() == Some(&snapshot) {
                return false;
            }
            *current = Some(Arc::new(snapshot));
            true
        });
        if changed {
            debug!("venue {}: published snapshot", self.venue_id);
            TickOutcome::Published
        } else {
            TickOutcome::Unchanged
        }
    }

    fn record_diagnostics(&self, d: &Diagnostics) {
        for (reason, count) in [
            ("unparseable_time", d.unparseable_time),
            ("unknown_category", d.unknown_category),
            ("invalid", d.invalid),
            ("unassigned_membership", d.unassigned_membership),
        ] {
            if count > 0 {
                metrics::counter!(RECORDS_SKIPPED_TOTAL, "reason" => reason).increment(count as u64);
            }
        }
        metrics::gauge!(OVERFLOW_DEMANDS, "venue" => self.venue_id.clone()).set(d.overflow as f64);

        if d.skipped() > 0 {
            warn!("venue {}: skipped {} reservation records: {d:?}", self.venue_id, d.skipped());
        }
        if d.overflow > 0 {
            warn!(
                "venue {}: {} demands exceed configured units, check upstream capacity gate",
                self.venue_id, d.overflow
            );
        }
    }

    fn record_failure(&self, err: RefreshError) -> TickOutcome {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!(CONSECUTIVE_FAILURES, "venue" => self.venue_id.clone()).set(failures as f64);
        let kept = self.snapshot().map(|s| s.taken_at.minute);
        if failures >= self.config.failure_alert_threshold {
            error!(
                "venue {}: {failures} consecutive refresh failures, keeping snapshot from minute {kept:?}: {err}",
                self.venue_id
            );
        } else {
            warn!("venue {}: refresh failed, keeping previous snapshot: {err}", self.venue_id);
        }
        TickOutcome::Failed
    }

    /// Booking-creation gate answered from the published snapshot.
    pub fn capacity_check(
        &self,
        category_id: &str,
        requested_units: u32,
        start_time: &str,
        duration_minutes: i64,
    ) -> Result<CapacityVerdict, RefreshError> {
        let snapshot = self.snapshot().ok_or(RefreshError::NoSnapshot)?;
        let now = self.clock.now();
        let verdict =
            snapshot.capacity_check(category_id, requested_units, start_time, duration_minutes, now.minute)?;
        record_capacity_check(&verdict);
        Ok(verdict)
    }

    /// Booking-creation gate answered from a fresh fetch of the store.
    pub async fn capacity_check_fresh(
        &self,
        category_id: &str,
        requested_units: u32,
        start_time: &str,
        duration_minutes: i64,
    ) -> Result<CapacityVerdict, RefreshError> {
        let data = self.fetch().await?;
        let now = self.clock.now();
        let verdict = check_capacity(&data, now, category_id, requested_units, start_time, duration_minutes)?;
        record_capacity_check(&verdict);
        Ok(verdict)
    }

    /// Tick on `config.interval` until `cancel` fires. The first tick is immediate.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "venue {}: refresh loop started (every {:?})",
            self.venue_id, self.config.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("venue {}: refresh loop stopped", self.venue_id);
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

fn record_capacity_check(verdict: &CapacityVerdict) {
    let allowed = if verdict.allowed { "true" } else { "false" };
    metrics::counter!(CAPACITY_CHECKS_TOTAL, "allowed" => allowed).increment(1);
}
