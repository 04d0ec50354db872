//! FIFO issue planning.
//!
//! Lots are consumed oldest first: ascending `received_at`, ties broken by
//! ascending lot id. Planning is all-or-nothing: if the lots cannot cover the
//! request, no allocation is returned.

use serde::Serialize;

use stockroom_core::{DomainError, LotId};

use crate::lot::{Lot, total_remaining};

/// Quantity to take from one lot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct IssueAllocation {
    pub lot_id: LotId,
    pub quantity: i64,
}

/// Sort lots into FIFO consumption order.
pub fn fifo_order(lots: &mut [Lot]) {
    lots.sort_by(|a, b| {
        a.received_at()
            .cmp(&b.received_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// Plan an issue of `requested` units against `lots`.
///
/// Lots with nothing remaining are skipped; input order does not matter.
pub fn plan_issue(lots: &[Lot], requested: i64) -> Result<Vec<IssueAllocation>, DomainError> {
    if requested <= 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }

    let mut available: Vec<Lot> = lots.iter().filter(|l| l.is_available()).cloned().collect();
    let total = total_remaining(&available)?;
    if total < requested {
        return Err(DomainError::insufficient_stock(requested, total));
    }

    fifo_order(&mut available);

    let mut needed = requested;
    let mut plan = Vec::new();
    for lot in &available {
        if needed == 0 {
            break;
        }
        let take = lot.remaining().min(needed);
        plan.push(IssueAllocation {
            lot_id: lot.id(),
            quantity: take,
        });
        needed -= take;
    }

    Ok(plan)
}
