use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use stockroom_core::{DomainError, ItemId, LotId};

/// A discrete batch of received stock.
///
/// # Invariants
/// - `received > 0`
/// - `0 <= remaining <= received`
///
/// Fields are private so every mutation goes through [`Lot::take`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    id: LotId,
    item_id: ItemId,
    received: i64,
    remaining: i64,
    expiry: Option<NaiveDate>,
    received_at: DateTime<Utc>,
}

impl Lot {
    /// A freshly received lot: `remaining == received == quantity`.
    pub fn receive(
        id: LotId,
        item_id: ItemId,
        quantity: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(Self {
            id,
            item_id,
            received: quantity,
            remaining: quantity,
            expiry,
            received_at,
        })
    }

    /// Rebuild a lot loaded from storage, re-checking its invariants.
    pub fn restore(
        id: LotId,
        item_id: ItemId,
        received: i64,
        remaining: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if received <= 0 || remaining < 0 || remaining > received {
            return Err(DomainError::invariant(format!(
                "lot {id} has remaining {remaining} outside 0..={received}"
            )));
        }
        Ok(Self {
            id,
            item_id,
            received,
            remaining,
            expiry,
            received_at,
        })
    }

    pub fn id(&self) -> LotId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn received(&self) -> i64 {
        self.received
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn is_available(&self) -> bool {
        self.remaining > 0
    }

    /// Consume `quantity` units from this lot.
    pub fn take(&mut self, quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if quantity > self.remaining {
            return Err(DomainError::invariant(format!(
                "lot {} holds {} but {} was taken",
                self.id, self.remaining, quantity
            )));
        }
        self.remaining -= quantity;
        Ok(())
    }
}

/// Sum of `remaining` across `lots`, failing instead of wrapping.
pub fn total_remaining<'a>(lots: impl IntoIterator<Item = &'a Lot>) -> Result<i64, DomainError> {
    lots.into_iter().try_fold(0i64, |acc, lot| {
        acc.checked_add(lot.remaining)
            .ok_or_else(|| DomainError::invariant(format!("on-hand total overflows at lot {}", lot.id)))
    })
}
