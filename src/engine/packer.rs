use tracing::{debug, warn};

use crate::model::*;

// ── Allocation Packer ─────────────────────────────────────────────

/// Which demand holds each unit of one category.
///
/// `placed` is the arena of assigned demands; `slots[unit - 1]` indexes into
/// it. A multi-unit demand has one arena entry referenced by several slots.
/// `deferred` demands have no unit of their own right now but have units
/// that are free for their whole span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    placed: Vec<Demand>,
    slots: Vec<Option<usize>>,
    deferred: Vec<Demand>,
    overflow: Vec<Demand>,
}

impl Allocation {
    pub fn total_units(&self) -> u32 {
        self.slots.len() as u32
    }

    /// The demand occupying `unit` (1-based), if any.
    pub fn occupant(&self, unit: u32) -> Option<&Demand> {
        let idx = unit.checked_sub(1)? as usize;
        self.slots.get(idx).copied().flatten().map(|i| &self.placed[i])
    }

    /// Every unit in order with its occupant.
    pub fn units(&self) -> impl Iterator<Item = (u32, Option<&Demand>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(move |(i, slot)| (i as u32 + 1, (*slot).map(|d| &self.placed[d])))
    }

    pub fn placed(&self) -> &[Demand] {
        &self.placed
    }

    pub fn deferred(&self) -> &[Demand] {
        &self.deferred
    }

    pub fn overflow(&self) -> &[Demand] {
        &self.overflow
    }

    /// All demands: placed, then deferred, then overflow.
    pub fn into_demands(self) -> Vec<Demand> {
        let mut all = self.placed;
        all.extend(self.deferred);
        all.extend(self.overflow);
        all
    }

    fn place(&mut self, demand: Demand, first_unit: usize, count: usize) {
        let idx = self.placed.len();
        self.placed.push(demand);
        for slot in &mut self.slots[first_unit..first_unit + count] {
            *slot = Some(idx);
        }
    }
}

/// The stretch of time a demand keeps its unit busy.
fn occupancy(demand: &Demand) -> Span {
    match demand.kind {
        DemandKind::Bounded { span } => span,
        DemandKind::Unbounded { started, .. } => Span::new(started, Minute::MAX),
    }
}

/// Assign demands of one category to its units.
///
/// Membership sessions go to the unit they were seated at; a second session on
/// an already taken unit overflows. Bounded demands are then sorted by
/// [`Demand::order_key`] and each takes the lowest run of `units` free,
/// contiguous unit numbers whose booked time does not collide with its span.
/// A demand with no such run waits as deferred if enough units are free for
/// its span, and overflows only if they are not.
pub fn pack(demands: Vec<Demand>, total_units: u32) -> Allocation {
    let mut alloc = Allocation {
        placed: Vec::with_capacity(demands.len()),
        slots: vec![None; total_units as usize],
        deferred: Vec::new(),
        overflow: Vec::new(),
    };
    // Spans already promised on each unit, placed or deferred.
    let mut held: Vec<Vec<Span>> = vec![Vec::new(); total_units as usize];

    let (mut pinned, mut bounded): (Vec<Demand>, Vec<Demand>) =
        demands.into_iter().partition(|d| !d.is_bounded());
    pinned.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    bounded.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    for demand in pinned {
        let DemandKind::Unbounded { unit, .. } = demand.kind else {
            continue;
        };
        let need = demand.units.max(1) as usize;
        let start = (unit as usize).saturating_sub(1);
        let fits = unit >= 1
            && start + need <= alloc.slots.len()
            && alloc.slots[start..start + need].iter().all(Option::is_none);
        if fits {
            let span = occupancy(&demand);
            for h in &mut held[start..start + need] {
                h.push(span);
            }
            alloc.place(demand, start, need);
        } else {
            warn!(
                "{} seated at taken or missing unit {unit} of {}",
                demand.reservation_id, demand.category_id
            );
            alloc.overflow.push(demand);
        }
    }

    for demand in bounded {
        let need = demand.units.max(1) as usize;
        let span = occupancy(&demand);
        if let Some(start) = first_fit(&alloc.slots, &held, span, need) {
            for h in &mut held[start..start + need] {
                h.push(span);
            }
            alloc.place(demand, start, need);
        } else if let Some(units) = free_during(&held, span, need) {
            for u in units {
                held[u].push(span);
            }
            debug!(
                "{} (part {}) waits for a unit of {} until {}",
                demand.reservation_id, demand.part, demand.category_id, span.start
            );
            alloc.deferred.push(demand);
        } else {
            warn!(
                "overbooked: {} (part {}) does not fit in {} units of {}",
                demand.reservation_id, demand.part, total_units, demand.category_id
            );
            alloc.overflow.push(demand);
        }
    }

    alloc
}

fn is_free(held: &[Span], span: Span) -> bool {
    held.iter().all(|h| !h.overlaps(&span))
}

/// Index of the first run of `need` unoccupied slots free for `span`.
fn first_fit(slots: &[Option<usize>], held: &[Vec<Span>], span: Span, need: usize) -> Option<usize> {
    let mut run = 0;
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_some() || !is_free(&held[i], span) {
            run = 0;
            continue;
        }
        run += 1;
        if run == need {
            return Some(i + 1 - need);
        }
    }
    None
}

/// The lowest `need` units, not necessarily adjacent, with nothing booked during `span`.
fn free_during(held: &[Vec<Span>], span: Span, need: usize) -> Option<Vec<usize>> {
    let units: Vec<usize> = (0..held.len())
        .filter(|&i| is_free(&held[i], span))
        .take(need)
        .collect();
    (units.len() == need).then_some(units)
}
