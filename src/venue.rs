use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::limits::*;
use crate::refresh::{RefreshConfig, Refresher, TickOutcome};
use crate::source::{Clock, ReservationSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    NameTooLong,
    EmptyName,
    TooManyVenues,
    ShutDown,
}

impl std::fmt::Display for VenueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueError::NameTooLong => write!(f, "venue id too long"),
            VenueError::EmptyName => write!(f, "empty venue id"),
            VenueError::TooManyVenues => write!(f, "too many venues"),
            VenueError::ShutDown => write!(f, "venue manager is shut down"),
        }
    }
}

impl std::error::Error for VenueError {}

/// Reduce a venue id to the characters allowed in file names.
fn sanitize(venue_id: &str) -> Result<String, VenueError> {
    if venue_id.len() > MAX_VENUE_ID_LEN {
        return Err(VenueError::NameTooLong);
    }
    let safe_id: String = venue_id
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe_id.is_empty() {
        return Err(VenueError::EmptyName);
    }
    Ok(safe_id)
}

/// Per-venue refreshers sharing one source, clock and config.
/// Venues are independent: one venue's failing fetch never touches another's snapshot.
pub struct VenueManager {
    refreshers: DashMap<String, Arc<Refresher>>,
    tasks: DashMap<String, JoinHandle<()>>,
    source: Arc<dyn ReservationSource>,
    clock: Arc<dyn Clock>,
    config: RefreshConfig,
    cancel: CancellationToken,
}

impl VenueManager {
    pub fn new(
        source: Arc<dyn ReservationSource>,
        clock: Arc<dyn Clock>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            refreshers: DashMap::new(),
            tasks: DashMap::new(),
            source,
            clock,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Get or lazily create the refresher for a venue. Does not start its loop.
    pub fn get_or_create(&self, venue_id: &str) -> Result<Arc<Refresher>, VenueError> {
        // Ids become file names for file-backed sources.
        let safe_id = sanitize(venue_id)?;
        if let Some(refresher) = self.refreshers.get(&safe_id) {
            return Ok(refresher.value().clone());
        }
        if self.refreshers.len() >= MAX_VENUES {
            return Err(VenueError::TooManyVenues);
        }

        let refresher = self
            .refreshers
            .entry(safe_id.clone())
            .or_insert_with(|| {
                info!("venue {safe_id}: registered");
                Arc::new(Refresher::new(
                    safe_id.clone(),
                    self.source.clone(),
                    self.clock.clone(),
                    self.config.clone(),
                ))
            })
            .value()
            .clone();
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.refreshers.len() as f64);
        Ok(refresher)
    }

    /// Look up a registered venue by the same id `get_or_create` accepts.
    pub fn get(&self, venue_id: &str) -> Option<Arc<Refresher>> {
        let safe_id = sanitize(venue_id).ok()?;
        self.refreshers.get(&safe_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.refreshers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refreshers.is_empty()
    }

    /// Register a venue and start its background loop if not already running.
    /// Fails once [`shutdown`](Self::shutdown) has been called.
    pub fn start(&self, venue_id: &str) -> Result<Arc<Refresher>, VenueError> {
        if self.cancel.is_cancelled() {
            warn!("venue {venue_id:?}: not started, manager is shut down");
            return Err(VenueError::ShutDown);
        }
        let refresher = self.get_or_create(venue_id)?;
        self.tasks
            .entry(refresher.venue_id().to_string())
            .or_insert_with(|| refresher.clone().spawn(self.cancel.child_token()));
        Ok(refresher)
    }

    /// Tick every registered venue once, concurrently.
    pub async fn refresh_all(&self) -> Vec<(String, TickOutcome)> {
        let refreshers: Vec<Arc<Refresher>> =
            self.refreshers.iter().map(|r| r.value().clone()).collect();
        let outcomes = join_all(refreshers.iter().map(|r| r.tick())).await;
        refreshers
            .iter()
            .map(|r| r.venue_id().to_string())
            .zip(outcomes)
            .collect()
    }

    /// Stop every background loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let venues: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        for venue in venues {
            if let Some((_, handle)) = self.tasks.remove(&venue)
                && let Err(e) = handle.await
            {
                tracing::error!("venue {venue}: refresh task failed: {e}");
            }
        }
        info!("all refresh loops stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::model::*;
    use crate::source::{ManualClock, SourceError};

    /// One pool table per venue; the venue named "broken" always fails.
    struct PerVenueSource;

    #[async_trait]
    impl ReservationSource for PerVenueSource {
        async fn fetch(&self, venue_id: &str) -> Result<VenueData, SourceError> {
            if venue_id == "broken" {
                return Err(SourceError::Unavailable("down".into()));
            }
            Ok(VenueData {
                categories: vec![StationCategory {
                    id: "pool".into(),
                    label: format!("Pool @ {venue_id}"),
                    total_units: 1,
                }],
                ..Default::default()
            })
        }
    }

    fn manager() -> VenueManager {
        VenueManager::new(
            Arc::new(PerVenueSource),
            Arc::new(ManualClock::new(Timestamp::at_minute(600))),
            RefreshConfig::default(),
        )
    }

    #[tokio::test]
    async fn venue_isolation() {
        let vm = manager();
        let good = vm.get_or_create("downtown").unwrap();
        let bad = vm.get_or_create("broken").unwrap();

        let outcomes = vm.refresh_all().await;
        assert_eq!(outcomes.len(), 2);
        for (venue, outcome) in outcomes {
            let expected = if venue == "broken" { TickOutcome::Failed } else { TickOutcome::Published };
            assert_eq!(outcome, expected, "{venue}");
        }

        let snapshot = good.snapshot().unwrap();
        assert_eq!(snapshot.categories[0].label, "Pool @ downtown");
        assert!(bad.snapshot().is_none());
        assert_eq!(bad.consecutive_failures(), 1);
        assert_eq!(good.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn venue_same_refresher_returned() {
        let vm = manager();
        let a = vm.get_or_create("foo").unwrap();
        let b = vm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &vm.get("foo").unwrap()));
        assert_eq!(vm.len(), 1);
    }

    #[tokio::test]
    async fn venue_id_sanitized() {
        let vm = manager();
        let r = vm.get_or_create("../evil").unwrap();
        assert_eq!(r.venue_id(), "evil");
        assert!(Arc::ptr_eq(&r, &vm.get_or_create("evil").unwrap()));

        assert_eq!(vm.get_or_create("../..").err(), Some(VenueError::EmptyName));
    }

    #[tokio::test]
    async fn get_sanitizes_like_get_or_create() {
        let vm = manager();
        let r = vm.get_or_create("../evil").unwrap();
        assert!(Arc::ptr_eq(&r, &vm.get("../evil").unwrap()));
        assert!(Arc::ptr_eq(&r, &vm.get("evil").unwrap()));
        assert!(vm.get("../..").is_none());
        assert!(vm.get(&"e".repeat(MAX_VENUE_ID_LEN + 1)).is_none());
    }

    #[tokio::test]
    async fn venue_id_too_long() {
        let vm = manager();
        let long_id = "x".repeat(MAX_VENUE_ID_LEN + 1);
        let err = vm.get_or_create(&long_id).err().unwrap();
        assert!(err.to_string().contains("venue id too long"));

        assert!(vm.get_or_create(&"x".repeat(MAX_VENUE_ID_LEN)).is_ok());
    }

    #[tokio::test]
    async fn venue_count_limit() {
        let vm = manager();
        for i in 0..MAX_VENUES {
            vm.get_or_create(&format!("v{i}")).unwrap();
        }
        let err = vm.get_or_create("one_more").err().unwrap();
        assert_eq!(err, VenueError::TooManyVenues);
        // Existing venues are still reachable at the limit.
        assert!(vm.get_or_create("v0").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_loop_until_shutdown() {
        let vm = manager();
        let r = vm.start("downtown").unwrap();
        vm.start("downtown").unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(r.snapshot().is_some());

        vm.shutdown().await;
        assert!(vm.tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_shutdown_is_refused() {
        let vm = manager();
        vm.shutdown().await;

        assert_eq!(vm.start("downtown").err(), Some(VenueError::ShutDown));
        assert!(vm.tasks.is_empty());
        // Registration without a loop still works.
        assert!(vm.get_or_create("downtown").is_ok());
    }
}
