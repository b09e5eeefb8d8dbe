use std::collections::BTreeMap;

use crate::model::*;

use super::interval::resolve;
use super::inventory::Inventory;
use super::packer::{pack, Allocation};
use super::status::{classify_occupant, slot_status};
use super::EngineError;

// ── Availability Aggregator ───────────────────────────────────────

/// Roll one category's units up into counts plus per-unit detail.
pub fn summarize(
    category: &StationCategory,
    alloc: &Allocation,
    now: Minute,
    ending_soon: Minute,
) -> CategorySummary {
    let mut summary = CategorySummary {
        category_id: category.id.clone(),
        label: category.label.clone(),
        total: category.total_units,
        free: 0,
        busy: 0,
        ending_soon: 0,
        slots: Vec::with_capacity(category.total_units as usize),
        overbooked: Vec::new(),
    };

    for (unit, demand) in alloc.units() {
        let slot = UnitSlot { category_id: category.id.clone(), unit };
        let status = slot_status(now, slot, demand, ending_soon);
        match status.state {
            SlotState::Free => summary.free += 1,
            SlotState::Busy => summary.busy += 1,
            SlotState::EndingSoon => summary.ending_soon += 1,
        }
        summary.slots.push(status);
    }

    summary.overbooked = alloc
        .overflow()
        .iter()
        .map(|d| classify_occupant(now, d, ending_soon).1)
        .collect();

    summary
}

/// Summaries for every category in inventory order. Categories without an
/// allocation are reported fully free.
pub fn aggregate(
    inventory: &Inventory,
    allocations: &BTreeMap<String, Allocation>,
    now: Minute,
    ending_soon: Minute,
) -> Vec<CategorySummary> {
    inventory
        .categories()
        .iter()
        .map(|category| match allocations.get(&category.id) {
            Some(alloc) => summarize(category, alloc, now, ending_soon),
            None => summarize(category, &pack(Vec::new(), category.total_units), now, ending_soon),
        })
        .collect()
}

// ── Capacity gate ─────────────────────────────────────────────────

/// Whether `demand` holds a unit at any point of `request`.
///
/// A booking counts only if it has not ended and its span overlaps; a
/// membership session counts from its start onward.
fn occupies_during(demand: &Demand, request: &Span, now: Minute) -> bool {
    match demand.kind {
        DemandKind::Bounded { span } => span.end > now && span.overlaps(request),
        DemandKind::Unbounded { started, .. } => request.end > started,
    }
}

/// Can `requested_units` more units be booked for `request` on top of `demands`?
pub fn capacity_check(
    total_units: u32,
    demands: &[Demand],
    requested_units: u32,
    request: Span,
    now: Minute,
) -> CapacityVerdict {
    let taken: u32 = demands
        .iter()
        .filter(|d| occupies_during(d, &request, now))
        .map(|d| d.units)
        .sum();
    let available_units = total_units.saturating_sub(taken);
    CapacityVerdict {
        allowed: requested_units >= 1 && requested_units <= available_units,
        available_units,
    }
}

impl Snapshot {
    /// Answer the booking-creation gate from this published snapshot.
    pub fn capacity_check(
        &self,
        category_id: &str,
        requested_units: u32,
        start_time: &str,
        duration_minutes: i64,
        now: Minute,
    ) -> Result<CapacityVerdict, EngineError> {
        if requested_units == 0 {
            return Err(EngineError::InvalidQuantity(requested_units));
        }
        let category = self
            .category(category_id)
            .ok_or_else(|| EngineError::UnknownCategory(category_id.to_string()))?;
        let request = resolve(start_time, duration_minutes)?;
        let demands = self.ledger.get(category_id).map_or(&[][..], Vec::as_slice);
        Ok(capacity_check(category.total, demands, requested_units, request, now))
    }
}
