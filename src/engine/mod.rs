mod aggregate;
mod classify;
mod error;
mod interval;
mod inventory;
mod packer;
mod status;

pub use aggregate::{aggregate, capacity_check, summarize};
pub use classify::{classify, classify_category, parse_unit_id, Classified};
pub use error::{EngineError, ParseError};
pub use interval::{format_clock, format_minutes, parse_clock, resolve};
pub use inventory::Inventory;
pub use packer::{pack, Allocation};
pub use status::{classify_occupant, slot_status};

use std::collections::BTreeMap;

use crate::limits::{ENDING_SOON_MINUTES, PLANNING_HORIZON_MINUTES};
use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minutes-left threshold at or below which a started booking is ending soon.
    pub ending_soon_minutes: Minute,
    /// Bookings starting more than this many minutes after now are kept out
    /// of unit assignment. They still count against the capacity gate.
    pub planning_horizon_minutes: Minute,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ending_soon_minutes: ENDING_SOON_MINUTES,
            planning_horizon_minutes: PLANNING_HORIZON_MINUTES,
        }
    }
}

/// Recompute a venue's occupancy from scratch.
///
/// Pure: the same data and `now` always give an equal snapshot. Only an
/// invalid inventory fails the whole computation; bad reservation records are
/// skipped and counted in [`Diagnostics`].
pub fn compute_snapshot(
    data: &VenueData,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<Snapshot, EngineError> {
    let inventory = Inventory::new(data.categories.clone())?;
    let classified = classify(data, &inventory, now);
    let mut diagnostics = classified.diagnostics;

    let horizon = now.minute.saturating_add(config.planning_horizon_minutes);
    let mut by_category: BTreeMap<String, Vec<Demand>> = BTreeMap::new();
    let mut upcoming: BTreeMap<String, Vec<Demand>> = BTreeMap::new();
    for demand in classified.demands {
        let later = matches!(demand.kind, DemandKind::Bounded { span } if span.start > horizon);
        let bucket = if later { &mut upcoming } else { &mut by_category };
        bucket
            .entry(demand.category_id.clone())
            .or_default()
            .push(demand);
    }
    diagnostics.beyond_horizon = upcoming.values().map(Vec::len).sum();

    let allocations: BTreeMap<String, Allocation> = inventory
        .categories()
        .iter()
        .map(|c| {
            let demands = by_category.remove(&c.id).unwrap_or_default();
            (c.id.clone(), pack(demands, c.total_units))
        })
        .collect();

    let categories = aggregate(&inventory, &allocations, now.minute, config.ending_soon_minutes);

    let mut ledger = BTreeMap::new();
    for (category_id, alloc) in allocations {
        diagnostics.overflow += alloc.overflow().len();
        diagnostics.deferred += alloc.deferred().len();
        let mut demands = alloc.into_demands();
        demands.extend(upcoming.remove(&category_id).unwrap_or_default());
        if !demands.is_empty() {
            ledger.insert(category_id, demands);
        }
    }

    Ok(Snapshot {
        taken_at: now,
        categories,
        ledger,
        diagnostics,
    })
}

/// Gate a new booking against freshly fetched data, looking only at the
/// requested category.
pub fn check_capacity(
    data: &VenueData,
    now: Timestamp,
    category_id: &str,
    requested_units: u32,
    start_time: &str,
    duration_minutes: i64,
) -> Result<CapacityVerdict, EngineError> {
    if requested_units == 0 {
        return Err(EngineError::InvalidQuantity(requested_units));
    }
    let inventory = Inventory::new(data.categories.clone())?;
    let total_units = inventory
        .total_units(category_id)
        .ok_or_else(|| EngineError::UnknownCategory(category_id.to_string()))?;
    let request = resolve(start_time, duration_minutes)?;
    let classified = classify_category(data, &inventory, now, category_id);
    Ok(capacity_check(
        total_units,
        &classified.demands,
        requested_units,
        request,
        now.minute,
    ))
}
