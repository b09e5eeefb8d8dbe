use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug)]
pub enum SourceError {
    NotFound(String),
    Io(io::Error),
    Decode(serde_json::Error),
    Timeout(Duration),
    Unavailable(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::NotFound(venue) => write!(f, "no data for venue: {venue}"),
            SourceError::Io(e) => write!(f, "io error: {e}"),
            SourceError::Decode(e) => write!(f, "decode error: {e}"),
            SourceError::Timeout(after) => write!(f, "fetch timed out after {after:?}"),
            SourceError::Unavailable(msg) => write!(f, "source unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> Self {
        SourceError::Io(e)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e)
    }
}

/// Read-only access to the booking store for one venue.
#[async_trait]
pub trait ReservationSource: Send + Sync + 'static {
    async fn fetch(&self, venue_id: &str) -> Result<VenueData, SourceError>;
}

/// Where "now" comes from.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Reads `<dir>/<venue_id>.json` on every fetch.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, venue_id: &str) -> PathBuf {
        self.dir.join(format!("{venue_id}.json"))
    }
}

#[async_trait]
impl ReservationSource for FileSource {
    async fn fetch(&self, venue_id: &str) -> Result<VenueData, SourceError> {
        let bytes = match tokio::fs::read(self.path_for(venue_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(venue_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Local wall-clock time of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(&chrono::Local::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    midnight_ms: Ms,
    minute: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            midnight_ms: now.midnight_ms,
            minute: AtomicI64::new(now.minute),
        }
    }

    pub fn set_minute(&self, minute: Minute) {
        self.minute.store(minute, Ordering::SeqCst);
    }

    pub fn advance(&self, minutes: Minute) {
        self.minute.fetch_add(minutes, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.midnight_ms, self.minute.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("occupancy_test_source").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn file_source_reads_venue_json() {
        let dir = test_dir("reads");
        std::fs::write(
            dir.join("downtown.json"),
            r#"{ "categories": [{ "id": "pool", "label": "Pool", "total_units": 2 }] }"#,
        )
        .unwrap();

        let source = FileSource::new(dir);
        let data = source.fetch("downtown").await.unwrap();
        assert_eq!(data.categories.len(), 1);
        assert!(data.bookings.is_empty());
    }

    #[tokio::test]
    async fn file_source_missing_venue() {
        let source = FileSource::new(test_dir("missing"));
        let err = source.fetch("nowhere").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(ref v) if v == "nowhere"));
    }

    #[tokio::test]
    async fn file_source_bad_json() {
        let dir = test_dir("bad_json");
        std::fs::write(dir.join("v.json"), "{ not json").unwrap();
        let err = FileSource::new(dir).fetch("v").await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
        assert!(err.to_string().starts_with("decode error"));
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(Timestamp::new(86_400_000, 600));
        assert_eq!(clock.now(), Timestamp::new(86_400_000, 600));
        clock.advance(15);
        assert_eq!(clock.now().minute, 615);
        clock.set_minute(0);
        assert_eq!(clock.now().minute, 0);
    }

    #[test]
    fn system_clock_is_within_the_day() {
        let now = SystemClock.now();
        assert!((0..MINUTES_PER_DAY).contains(&now.minute));
    }
}
