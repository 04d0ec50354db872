//! Receive/Issue commands and their pure execution.
//!
//! Storage backends load the relevant lots inside their own unit of work,
//! call `execute`, then persist the returned lots and transactions together.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use stockroom_core::{DomainError, ItemId, LotId, TransactionId, UserId};

use crate::fifo::plan_issue;
use crate::lot::{Lot, total_remaining};
use crate::transaction::StockTransaction;

const MAX_NOTE_LEN: usize = 255;

/// Command: ReceiveStock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveStock {
    pub item_id: ItemId,
    pub quantity: i64,
    pub expiry: Option<NaiveDate>,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueStock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueStock {
    pub item_id: ItemId,
    pub quantity: i64,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveOutcome {
    pub lot: Lot,
    pub transaction: StockTransaction,
}

/// A lot after an issue consumed `taken` units from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedLot {
    pub lot: Lot,
    pub taken: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueOutcome {
    /// Consumed lots in FIFO order.
    pub consumed: Vec<ConsumedLot>,
    /// One issue transaction per consumed lot, same order.
    pub transactions: Vec<StockTransaction>,
}

impl IssueOutcome {
    /// Bounded by the planned request, which is an `i64`.
    pub fn total_taken(&self) -> i64 {
        self.consumed.iter().map(|c| c.taken).sum()
    }
}

impl ReceiveStock {
    pub fn validate(&self) -> Result<(), DomainError> {
        ensure_positive(self.quantity)?;
        validate_note(self.note.as_deref())
    }

    /// Reject a receipt that would push the item's on-hand past `i64::MAX`.
    ///
    /// `existing` are the item's current lots, read in the same unit of work
    /// as the insert.
    pub fn check_capacity(&self, existing: &[Lot]) -> Result<(), DomainError> {
        let on_hand = total_remaining(existing)?;
        match on_hand.checked_add(self.quantity) {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!(
                "receiving {} would exceed the maximum on-hand quantity (currently {on_hand})",
                self.quantity
            ))),
        }
    }

    pub fn execute(&self, lot_id: LotId, transaction_id: TransactionId) -> Result<ReceiveOutcome, DomainError> {
        self.validate()?;

        let lot = Lot::receive(lot_id, self.item_id, self.quantity, self.expiry, self.occurred_at)?;
        let transaction = StockTransaction::receipt(
            transaction_id,
            self.item_id,
            lot_id,
            self.quantity,
            self.occurred_at,
            self.actor,
            normalize_note(self.note.as_deref()),
        );

        Ok(ReceiveOutcome { lot, transaction })
    }
}

impl IssueStock {
    pub fn validate(&self) -> Result<(), DomainError> {
        ensure_positive(self.quantity)?;
        validate_note(self.note.as_deref())
    }

    /// Plan the issue against `lots` (the item's lots, any order) and apply it
    /// to copies of the consumed lots.
    ///
    /// On error nothing is returned, so the caller has nothing to persist.
    pub fn execute(
        &self,
        lots: &[Lot],
        mut next_transaction_id: impl FnMut() -> TransactionId,
    ) -> Result<IssueOutcome, DomainError> {
        self.validate()?;

        if let Some(stray) = lots.iter().find(|l| l.item_id() != self.item_id) {
            return Err(DomainError::invariant(format!(
                "lot {} belongs to item {}, not {}",
                stray.id(),
                stray.item_id(),
                self.item_id
            )));
        }

        let plan = plan_issue(lots, self.quantity)?;
        let note = normalize_note(self.note.as_deref());

        let mut consumed = Vec::with_capacity(plan.len());
        let mut transactions = Vec::with_capacity(plan.len());
        for alloc in plan {
            let mut lot = lots
                .iter()
                .find(|l| l.id() == alloc.lot_id)
                .cloned()
                .ok_or_else(|| DomainError::invariant("planned lot missing from input"))?;
            lot.take(alloc.quantity)?;

            transactions.push(StockTransaction::issue(
                next_transaction_id(),
                self.item_id,
                lot.id(),
                alloc.quantity,
                self.occurred_at,
                self.actor,
                note.clone(),
            ));
            consumed.push(ConsumedLot {
                lot,
                taken: alloc.quantity,
            });
        }

        Ok(IssueOutcome {
            consumed,
            transactions,
        })
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

fn validate_note(note: Option<&str>) -> Result<(), DomainError> {
    match note {
        Some(n) if n.trim().chars().count() > MAX_NOTE_LEN => Err(DomainError::validation(format!(
            "note cannot exceed {MAX_NOTE_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use crate::transaction::TransactionKind;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::days(n)
    }

    fn receive(item_id: ItemId, quantity: i64, at: DateTime<Utc>, seq: u128) -> Lot {
        ReceiveStock {
            item_id,
            quantity,
            expiry: None,
            actor: UserId::new(),
            note: None,
            occurred_at: at,
        }
        .execute(LotId::from_uuid(Uuid::from_u128(seq)), TransactionId::new())
        .unwrap()
        .lot
    }

    fn issue(item_id: ItemId, quantity: i64) -> IssueStock {
        IssueStock {
            item_id,
            quantity,
            actor: UserId::new(),
            note: Some("  ward 3 ".to_string()),
            occurred_at: day(5),
        }
    }

    #[test]
    fn receive_produces_full_lot_and_positive_transaction() {
        let item = ItemId::new();
        let cmd = ReceiveStock {
            item_id: item,
            quantity: 10,
            expiry: NaiveDate::from_ymd_opt(2025, 1, 31),
            actor: UserId::new(),
            note: Some("   ".to_string()),
            occurred_at: day(1),
        };

        let out = cmd.execute(LotId::new(), TransactionId::new()).unwrap();

        assert_eq!(out.lot.remaining(), 10);
        assert_eq!(out.lot.expiry(), NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(out.transaction.kind, TransactionKind::Receive);
        assert_eq!(out.transaction.quantity, 10);
        assert_eq!(out.transaction.lot_id, out.lot.id());
        assert_eq!(out.transaction.note, None);
    }

    #[test]
    fn receipt_beyond_maximum_on_hand_is_rejected() {
        let item = ItemId::new();
        let full = receive(item, i64::MAX, day(1), 1);
        let cmd = ReceiveStock {
            item_id: item,
            quantity: 1,
            expiry: None,
            actor: UserId::new(),
            note: None,
            occurred_at: day(2),
        };

        assert!(matches!(cmd.check_capacity(&[full.clone()]), Err(DomainError::Validation(_))));
        assert!(cmd.check_capacity(&[]).is_ok());

        let mut drained = full;
        drained.take(1).unwrap();
        assert!(cmd.check_capacity(&[drained]).is_ok());
    }

    #[test]
    fn issue_spanning_two_lots() {
        let item = ItemId::new();
        let lot1 = receive(item, 10, day(1), 1);
        let lot2 = receive(item, 5, day(2), 2);

        let out = issue(item, 12).execute(&[lot1.clone(), lot2.clone()], TransactionId::new).unwrap();

        assert_eq!(out.total_taken(), 12);
        assert_eq!(out.consumed[0].lot.id(), lot1.id());
        assert_eq!(out.consumed[0].lot.remaining(), 0);
        assert_eq!(out.consumed[1].lot.id(), lot2.id());
        assert_eq!(out.consumed[1].lot.remaining(), 3);

        let quantities: Vec<i64> = out.transactions.iter().map(|t| t.quantity).collect();
        assert_eq!(quantities, vec![-10, -2]);
        assert!(out.transactions.iter().all(|t| t.note.as_deref() == Some("ward 3")));
    }

    #[test]
    fn shortage_leaves_input_untouched() {
        let item = ItemId::new();
        let lots = vec![receive(item, 10, day(1), 1)];

        let err = issue(item, 11).execute(&lots, TransactionId::new).unwrap_err();

        assert_eq!(err, DomainError::InsufficientStock { requested: 11, available: 10 });
        assert_eq!(lots[0].remaining(), 10);
    }

    #[test]
    fn foreign_lots_are_rejected() {
        let item = ItemId::new();
        let other = receive(ItemId::new(), 10, day(1), 1);

        let err = issue(item, 1).execute(&[other], TransactionId::new).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overlong_note_is_rejected() {
        let mut cmd = issue(ItemId::new(), 1);
        cmd.note = Some("x".repeat(MAX_NOTE_LEN + 1));
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }
}
