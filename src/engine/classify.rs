use tracing::{debug, warn};

use crate::limits::MAX_QUANTITY_PER_BOOKING;
use crate::model::*;

use super::interval::resolve;
use super::inventory::Inventory;
use super::ParseError;

/// Demands derived from one batch of raw records, plus what was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub demands: Vec<Demand>,
    pub diagnostics: Diagnostics,
}

/// Turn raw bookings and membership sessions into atomic demands.
///
/// Bounded bookings already over at `now` are dropped; membership sessions are
/// never dropped by time. A booking for N units yields N demands of one unit.
pub fn classify(data: &VenueData, inventory: &Inventory, now: Timestamp) -> Classified {
    classify_where(data, inventory, now, |_| true)
}

/// Same as [`classify`], restricted to a single category.
pub fn classify_category(
    data: &VenueData,
    inventory: &Inventory,
    now: Timestamp,
    category_id: &str,
) -> Classified {
    classify_where(data, inventory, now, |id| id == category_id)
}

fn classify_where(
    data: &VenueData,
    inventory: &Inventory,
    now: Timestamp,
    wanted: impl Fn(&str) -> bool,
) -> Classified {
    let mut out = Classified::default();

    for booking in &data.bookings {
        if booking.status.is_terminal() || !wanted(&booking.category_id) {
            continue;
        }
        classify_booking(booking, inventory, now, &mut out);
    }
    for membership in &data.memberships {
        if !membership.is_active || !wanted(&membership.category_id) {
            continue;
        }
        classify_membership(membership, inventory, now, &mut out);
    }

    out
}

fn classify_booking(booking: &RawBooking, inventory: &Inventory, now: Timestamp, out: &mut Classified) {
    if inventory.get(&booking.category_id).is_none() {
        warn!("booking {} names unknown category {:?}", booking.id, booking.category_id);
        out.diagnostics.unknown_category += 1;
        return;
    }
    if booking.quantity == 0 || booking.quantity > MAX_QUANTITY_PER_BOOKING {
        warn!("booking {} has invalid quantity {}", booking.id, booking.quantity);
        out.diagnostics.invalid += 1;
        return;
    }

    let span = match resolve(&booking.start_time, booking.duration_minutes) {
        Ok(span) => span,
        Err(e @ ParseError::Unrecognized(_)) => {
            warn!("skipping booking {}: {e}", booking.id);
            out.diagnostics.unparseable_time += 1;
            return;
        }
        Err(e @ ParseError::InvalidDuration(_)) => {
            warn!("skipping booking {}: {e}", booking.id);
            out.diagnostics.invalid += 1;
            return;
        }
    };

    if span.end <= now.minute {
        out.diagnostics.finished += 1;
        return;
    }

    let origin = if booking.walk_in { Origin::WalkIn } else { Origin::Booking };
    out.demands.extend((0..booking.quantity).map(|part| Demand {
        reservation_id: booking.id.clone(),
        category_id: booking.category_id.clone(),
        part,
        units: 1,
        kind: DemandKind::Bounded { span },
        occupant: booking.occupant_label.clone(),
        origin,
        extras: booking.extras,
        created_at: booking.created_at,
    }));
}

fn classify_membership(
    membership: &RawMembership,
    inventory: &Inventory,
    now: Timestamp,
    out: &mut Classified,
) {
    let Some(total_units) = inventory.total_units(&membership.category_id) else {
        warn!(
            "membership {} names unknown category {:?}",
            membership.id, membership.category_id
        );
        out.diagnostics.unknown_category += 1;
        return;
    };

    let unit = membership
        .assigned_unit
        .as_deref()
        .and_then(parse_unit_id)
        .filter(|&unit| unit <= total_units);
    let Some(unit) = unit else {
        warn!(
            "membership {} has no valid station (assigned {:?}, {} units in {})",
            membership.id, membership.assigned_unit, total_units, membership.category_id
        );
        out.diagnostics.unassigned_membership += 1;
        return;
    };

    let started = match membership.timer_started_at {
        Some(ts) => match now.minute_of(ts) {
            Some(minute) => minute,
            None => {
                warn!("membership {} has out-of-range timer start {ts}", membership.id);
                out.diagnostics.invalid += 1;
                return;
            }
        },
        None => {
            debug!("membership {} has no timer start, using tick time", membership.id);
            now.minute
        }
    };

    out.demands.push(Demand {
        reservation_id: membership.id.clone(),
        category_id: membership.category_id.clone(),
        part: 0,
        units: 1,
        kind: DemandKind::Unbounded { started, unit },
        occupant: membership.occupant_label.clone(),
        origin: Origin::Membership,
        extras: None,
        created_at: membership.timer_started_at.unwrap_or(0),
    });
}

/// Read a station identifier: a bare number ("3") or a label ending in one
/// after a separator ("ps5-3", "PS5 #3"). A label with digits glued to its
/// name ("ps5") names no station. Units are 1-based, so "0" is not a station.
pub fn parse_unit_id(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let prefix = trimmed.trim_end_matches(|c: char| c.is_ascii_digit());
    if prefix.chars().next_back().is_some_and(char::is_alphanumeric) {
        return None;
    }
    trimmed[prefix.len()..].parse().ok().filter(|&unit| unit >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Inventory {
        Inventory::new(vec![
            StationCategory { id: "ps5".into(), label: "PS5".into(), total_units: 4 },
            StationCategory { id: "pool".into(), label: "Pool".into(), total_units: 2 },
        ])
        .unwrap()
    }

    fn booking(id: &str, category: &str, quantity: u32, start: &str, duration: i64) -> RawBooking {
        RawBooking {
            id: id.into(),
            category_id: category.into(),
            quantity,
            start_time: start.into(),
            duration_minutes: duration,
            occupant_label: format!("guest-{id}"),
            status: BookingStatus::Confirmed,
            walk_in: false,
            extras: None,
            created_at: 0,
        }
    }

    fn membership(id: &str, unit: Option<&str>, started_min: Option<Minute>) -> RawMembership {
        RawMembership {
            id: id.into(),
            category_id: "ps5".into(),
            assigned_unit: unit.map(String::from),
            timer_started_at: started_min.map(|m| m * MS_PER_MINUTE),
            occupant_label: format!("member-{id}"),
            is_active: true,
        }
    }

    fn data(bookings: Vec<RawBooking>, memberships: Vec<RawMembership>) -> VenueData {
        VenueData { categories: vec![], bookings, memberships }
    }

    #[test]
    fn quantity_expands_to_atomic_demands() {
        let mut b = booking("b1", "ps5", 3, "10:00", 60);
        b.extras = Some(2);
        b.walk_in = true;
        let out = classify(&data(vec![b], vec![]), &inventory(), Timestamp::at_minute(540));

        assert_eq!(out.demands.len(), 3);
        for (i, d) in out.demands.iter().enumerate() {
            assert_eq!(d.part, i as u32);
            assert_eq!(d.units, 1);
            assert_eq!(d.occupant, "guest-b1");
            assert_eq!(d.extras, Some(2));
            assert_eq!(d.origin, Origin::WalkIn);
            assert_eq!(d.kind, DemandKind::Bounded { span: Span::new(600, 660) });
        }
    }

    #[test]
    fn finished_and_terminal_bookings_dropped() {
        let mut cancelled = booking("b2", "ps5", 1, "10:00", 60);
        cancelled.status = BookingStatus::Cancelled;
        let bookings = vec![
            booking("b1", "ps5", 1, "9:00", 60), // ends at 600 == now
            cancelled,
            booking("b3", "ps5", 1, "9:30", 60), // ends at 630
        ];
        let out = classify(&data(bookings, vec![]), &inventory(), Timestamp::at_minute(600));
        assert_eq!(out.demands.len(), 1);
        assert_eq!(out.demands[0].reservation_id, "b3");
        assert_eq!(out.diagnostics.finished, 1);
        assert_eq!(out.diagnostics.skipped(), 0);
    }

    #[test]
    fn bad_records_counted_not_fatal() {
        let bookings = vec![
            booking("b1", "ps5", 1, "half past ten", 60),
            booking("b2", "xbox", 1, "10:00", 60),
            booking("b3", "ps5", 0, "10:00", 60),
            booking("b4", "ps5", 1, "10:00", 0),
            booking("b5", "pool", 1, "10:00", 30),
        ];
        let out = classify(&data(bookings, vec![]), &inventory(), Timestamp::at_minute(540));
        assert_eq!(out.demands.len(), 1);
        assert_eq!(out.diagnostics.unparseable_time, 1);
        assert_eq!(out.diagnostics.unknown_category, 1);
        assert_eq!(out.diagnostics.invalid, 2);
    }

    #[test]
    fn membership_pinned_to_assigned_unit() {
        let out = classify(
            &data(vec![], vec![membership("m1", Some("PS5 #2"), Some(540))]),
            &inventory(),
            Timestamp::at_minute(600),
        );
        assert_eq!(out.demands.len(), 1);
        assert_eq!(out.demands[0].kind, DemandKind::Unbounded { started: 540, unit: 2 });
        assert_eq!(out.demands[0].origin, Origin::Membership);
    }

    #[test]
    fn membership_never_filtered_by_time() {
        // Timer started the previous evening; still live.
        let out = classify(
            &data(vec![], vec![membership("m1", Some("1"), Some(-120))]),
            &inventory(),
            Timestamp::at_minute(30),
        );
        assert_eq!(out.demands[0].kind, DemandKind::Unbounded { started: -120, unit: 1 });
    }

    #[test]
    fn membership_without_valid_unit_dropped() {
        let memberships = vec![
            membership("m1", None, Some(540)),
            membership("m2", Some("ps5-9"), Some(540)), // only 4 units
            membership("m3", Some("station"), Some(540)),
            membership("m4", Some("0"), Some(540)),
        ];
        let out = classify(&data(vec![], memberships), &inventory(), Timestamp::at_minute(600));
        assert!(out.demands.is_empty());
        assert_eq!(out.diagnostics.unassigned_membership, 4);
    }

    #[test]
    fn inactive_membership_ignored() {
        let mut m = membership("m1", Some("1"), Some(540));
        m.is_active = false;
        let out = classify(&data(vec![], vec![m]), &inventory(), Timestamp::at_minute(600));
        assert!(out.demands.is_empty());
        assert_eq!(out.diagnostics, Diagnostics::default());
    }

    #[test]
    fn membership_without_timer_starts_now() {
        let out = classify(
            &data(vec![], vec![membership("m1", Some("3"), None)]),
            &inventory(),
            Timestamp::at_minute(610),
        );
        assert_eq!(out.demands[0].kind, DemandKind::Unbounded { started: 610, unit: 3 });
    }

    #[test]
    fn category_filter() {
        let bookings = vec![
            booking("b1", "ps5", 2, "10:00", 60),
            booking("b2", "pool", 1, "10:00", 60),
            booking("b3", "xbox", 1, "10:00", 60),
        ];
        let out = classify_category(&data(bookings, vec![]), &inventory(), Timestamp::at_minute(540), "pool");
        assert_eq!(out.demands.len(), 1);
        assert_eq!(out.demands[0].reservation_id, "b2");
        // Other categories are not inspected, so their problems are not counted.
        assert_eq!(out.diagnostics.unknown_category, 0);
    }

    #[test]
    fn unit_id_forms() {
        assert_eq!(parse_unit_id("3"), Some(3));
        assert_eq!(parse_unit_id(" ps5-12 "), Some(12));
        assert_eq!(parse_unit_id("PS5 #2"), Some(2));
        assert_eq!(parse_unit_id("station"), None);
        assert_eq!(parse_unit_id(""), None);
        assert_eq!(parse_unit_id("0"), None);
        // Digits that belong to the name are not a station number.
        assert_eq!(parse_unit_id("ps5"), None);
        assert_eq!(parse_unit_id("PS5"), None);
        assert_eq!(parse_unit_id("ps5-"), None);
    }

    #[test]
    fn station_label_without_number_is_unassigned() {
        let inventory = Inventory::new(vec![StationCategory {
            id: "ps5".into(),
            label: "PS5".into(),
            total_units: 6,
        }])
        .unwrap();
        let out = classify(
            &data(vec![], vec![membership("m", Some("ps5"), Some(540))]),
            &inventory,
            Timestamp::at_minute(600),
        );
        assert!(out.demands.is_empty());
        assert_eq!(out.diagnostics.unassigned_membership, 1);
    }

    #[test]
    fn out_of_range_timer_counted_invalid() {
        let mut extreme = membership("m1", Some("1"), None);
        extreme.timer_started_at = Some(i64::MIN);
        let memberships = vec![extreme, membership("m2", Some("2"), Some(540))];
        let out = classify(
            &data(vec![], memberships),
            &inventory(),
            Timestamp::new(1_760_000_000_000, 600),
        );
        assert_eq!(out.diagnostics.invalid, 1);
        assert_eq!(out.demands.len(), 1);
        assert_eq!(out.demands[0].reservation_id, "m2");
    }
}
