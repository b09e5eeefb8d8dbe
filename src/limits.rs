use crate::model::Minute;

/// A bounded booking with this many minutes or fewer left is "ending soon".
pub const ENDING_SOON_MINUTES: Minute = 15;

/// Bookings starting further ahead than this are not assigned to units yet.
pub const PLANNING_HORIZON_MINUTES: Minute = 60;

pub const MAX_UNITS_PER_CATEGORY: u32 = 1024;
pub const MAX_CATEGORIES_PER_VENUE: usize = 256;
pub const MAX_QUANTITY_PER_BOOKING: u32 = 64;

/// Longest single booking accepted (two days).
pub const MAX_DURATION_MINUTES: Minute = 2 * 1440;

pub const MAX_VENUES: usize = 1024;
pub const MAX_VENUE_ID_LEN: usize = 128;
