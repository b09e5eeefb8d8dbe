use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Unix milliseconds, as stored upstream.
pub type Ms = i64;

/// Minutes since venue-local midnight of the tick's day. Negative for earlier
/// days, and allowed past 1440 for sessions that run overnight.
pub type Minute = i64;

pub const MS_PER_MINUTE: Ms = 60_000;
pub const MINUTES_PER_DAY: Minute = 1440;

/// Half-open interval `[start, end)` on the minute timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minute) -> bool {
        self.start <= t && t < self.end
    }
}

/// The explicit "now" of a tick: which day it is and the minute within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Unix ms of venue-local midnight starting the day.
    pub midnight_ms: Ms,
    pub minute: Minute,
}

impl Timestamp {
    pub fn new(midnight_ms: Ms, minute: Minute) -> Self {
        Self { midnight_ms, minute }
    }

    /// A timestamp on the day whose midnight is the unix epoch.
    pub fn at_minute(minute: Minute) -> Self {
        Self::new(0, minute)
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        let secs = dt.num_seconds_from_midnight() as Ms;
        let since_midnight_ms = secs * 1000 + dt.timestamp_subsec_millis() as Ms;
        Self {
            midnight_ms: dt.timestamp_millis() - since_midnight_ms,
            minute: secs / 60,
        }
    }

    /// Map a unix timestamp onto this day's minute timeline (floored).
    /// `None` when `ts` is too far from this day to represent.
    pub fn minute_of(&self, ts: Ms) -> Option<Minute> {
        ts.checked_sub(self.midnight_ms)?.checked_div_euclid(MS_PER_MINUTE)
    }
}

// ── Raw input records ────────────────────────────────────────────

/// One equipment type at a venue and how many physical units it has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCategory {
    pub id: String,
    pub label: String,
    pub total_units: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

/// A booking line as the store hands it over: one category, `quantity` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBooking {
    pub id: String,
    pub category_id: String,
    pub quantity: u32,
    /// "h:mm am/pm" or "HH:mm", optionally with seconds.
    pub start_time: String,
    pub duration_minutes: i64,
    pub occupant_label: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub walk_in: bool,
    /// Controllers (or other add-ons) per unit. Display only.
    #[serde(default)]
    pub extras: Option<u32>,
    #[serde(default)]
    pub created_at: Ms,
}

/// A membership time-tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMembership {
    pub id: String,
    pub category_id: String,
    /// Station the operator seated the member at, e.g. "3" or "ps5-3".
    #[serde(default)]
    pub assigned_unit: Option<String>,
    #[serde(default)]
    pub timer_started_at: Option<Ms>,
    pub occupant_label: String,
    pub is_active: bool,
}

/// Everything one fetch returns for a venue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueData {
    pub categories: Vec<StationCategory>,
    #[serde(default)]
    pub bookings: Vec<RawBooking>,
    #[serde(default)]
    pub memberships: Vec<RawMembership>,
}

// ── Demands ──────────────────────────────────────────────────────

/// Where a demand came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Booking,
    WalkIn,
    Membership,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandKind {
    /// Ordinary or walk-in booking with a known end.
    Bounded { span: Span },
    /// Membership session pinned to a unit. Runs until stopped upstream.
    Unbounded { started: Minute, unit: u32 },
}

/// One atomic request for capacity, derived from a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub reservation_id: String,
    pub category_id: String,
    /// Position within the source record's expansion (0-based).
    pub part: u32,
    pub units: u32,
    pub kind: DemandKind,
    pub occupant: String,
    pub origin: Origin,
    pub extras: Option<u32>,
    pub created_at: Ms,
}

impl Demand {
    pub fn is_bounded(&self) -> bool {
        matches!(self.kind, DemandKind::Bounded { .. })
    }

    /// Stable packing order: arrival, then record id, then expansion index.
    pub fn order_key(&self) -> (Ms, &str, u32) {
        (self.created_at, self.reservation_id.as_str(), self.part)
    }
}

// ── Snapshot types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSlot {
    pub category_id: String,
    /// 1-based.
    pub unit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Free,
    Busy,
    EndingSoon,
}

/// The time figure shown next to an occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timing {
    /// Booked but not started yet.
    StartsIn(Minute),
    /// Active booking, minutes until its end.
    Remaining(Minute),
    /// Membership session, minutes since its timer started.
    Elapsed(Minute),
}

impl Timing {
    pub fn minutes(self) -> Minute {
        match self {
            Timing::StartsIn(m) | Timing::Remaining(m) | Timing::Elapsed(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantInfo {
    pub reservation_id: String,
    pub label: String,
    pub origin: Origin,
    pub start_clock: String,
    /// `None` for membership sessions.
    pub end_clock: Option<String>,
    pub timing: Timing,
    pub extras: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub slot: UnitSlot,
    pub state: SlotState,
    pub occupant: Option<OccupantInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category_id: String,
    pub label: String,
    pub total: u32,
    pub free: u32,
    pub busy: u32,
    pub ending_soon: u32,
    pub slots: Vec<SlotStatus>,
    /// Demands that did not fit. Non-empty means upstream accepted too much.
    pub overbooked: Vec<OccupantInfo>,
}

/// Per-tick counters of records that were left out, and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub unparseable_time: usize,
    pub unknown_category: usize,
    pub invalid: usize,
    pub unassigned_membership: usize,
    /// Bounded bookings already over at tick time. Not an error.
    pub finished: usize,
    pub overflow: usize,
    /// Bookings waiting for a unit that is busy now but free for their span.
    pub deferred: usize,
    /// Bookings starting past the planning horizon, left out of unit assignment.
    pub beyond_horizon: usize,
}

impl Diagnostics {
    pub fn skipped(&self) -> usize {
        self.unparseable_time + self.unknown_category + self.invalid + self.unassigned_membership
    }
}

/// The complete, immutable result of one recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: Timestamp,
    pub categories: Vec<CategorySummary>,
    /// Every live demand per category, assigned or overflowed.
    pub ledger: BTreeMap<String, Vec<Demand>>,
    pub diagnostics: Diagnostics,
}

impl Snapshot {
    pub fn category(&self, category_id: &str) -> Option<&CategorySummary> {
        self.categories.iter().find(|c| c.category_id == category_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityVerdict {
    pub allowed: bool,
    pub available_units: u32,
}
