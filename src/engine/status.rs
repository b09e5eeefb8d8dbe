use std::fmt;

use crate::model::*;

use super::interval::{format_clock, format_minutes};

/// State and occupant details for a held unit.
///
/// Memberships are always `Busy` and report elapsed time. Bookings that have
/// not started are `Busy` with a starts-in figure; started bookings are
/// `EndingSoon` once `ending_soon` or fewer minutes remain.
pub fn classify_occupant(now: Minute, demand: &Demand, ending_soon: Minute) -> (SlotState, OccupantInfo) {
    let (state, timing, start, end) = match demand.kind {
        DemandKind::Unbounded { started, .. } => {
            (SlotState::Busy, Timing::Elapsed((now - started).max(0)), started, None)
        }
        DemandKind::Bounded { span } if now < span.start => {
            (SlotState::Busy, Timing::StartsIn(span.start - now), span.start, Some(span.end))
        }
        DemandKind::Bounded { span } => {
            let remaining = span.end - now;
            let state = if remaining <= ending_soon {
                SlotState::EndingSoon
            } else {
                SlotState::Busy
            };
            (state, Timing::Remaining(remaining.max(0)), span.start, Some(span.end))
        }
    };

    let info = OccupantInfo {
        reservation_id: demand.reservation_id.clone(),
        label: demand.occupant.clone(),
        origin: demand.origin,
        start_clock: format_clock(start),
        end_clock: end.map(format_clock),
        timing,
        extras: demand.extras,
    };
    (state, info)
}

pub fn slot_status(now: Minute, slot: UnitSlot, demand: Option<&Demand>, ending_soon: Minute) -> SlotStatus {
    match demand {
        None => SlotStatus { slot, state: SlotState::Free, occupant: None },
        Some(demand) => {
            let (state, info) = classify_occupant(now, demand, ending_soon);
            SlotStatus { slot, state, occupant: Some(info) }
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Timing::StartsIn(m) => write!(f, "starts in {}", format_minutes(m)),
            Timing::Remaining(m) => write!(f, "{} left", format_minutes(m)),
            Timing::Elapsed(m) => write!(f, "{} elapsed", format_minutes(m)),
        }
    }
}
