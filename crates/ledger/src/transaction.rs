use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, ItemId, LotId, TransactionId, UserId};

/// Kind of audit-trail entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Receive,
    Issue,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Receive => "receive",
            TransactionKind::Issue => "issue",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receive" => Ok(TransactionKind::Receive),
            "issue" => Ok(TransactionKind::Issue),
            other => Err(DomainError::validation(format!(
                "unknown transaction kind '{other}' (expected receive or issue)"
            ))),
        }
    }
}

/// Immutable audit record of one quantity change against one lot.
///
/// `quantity` is signed: positive for receive, negative for issue. Summing it
/// per item reproduces the item's on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub item_id: ItemId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor: UserId,
    pub note: Option<String>,
}

impl StockTransaction {
    pub fn receipt(
        id: TransactionId,
        item_id: ItemId,
        lot_id: LotId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        actor: UserId,
        note: Option<String>,
    ) -> Self {
        Self {
            id,
            kind: TransactionKind::Receive,
            item_id,
            lot_id,
            quantity,
            occurred_at,
            actor,
            note,
        }
    }

    /// `taken` is the positive amount consumed from the lot; it is stored negated.
    pub fn issue(
        id: TransactionId,
        item_id: ItemId,
        lot_id: LotId,
        taken: i64,
        occurred_at: DateTime<Utc>,
        actor: UserId,
        note: Option<String>,
    ) -> Self {
        Self {
            id,
            kind: TransactionKind::Issue,
            item_id,
            lot_id,
            quantity: -taken,
            occurred_at,
            actor,
            note,
        }
    }
}
