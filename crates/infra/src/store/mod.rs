//! Storage abstractions for the catalog, the stock ledger and user accounts.
//!
//! Two backends implement the same traits:
//!
//! - [`InMemoryStore`] for dev/test, one `RwLock` around all state.
//! - [`PostgresStore`] backed by `sqlx`, one database transaction per mutation.
//!
//! Both delegate every stock decision to `stockroom-ledger` (`ReceiveStock::execute`,
//! `IssueStock::execute`); a backend only loads lots, locks them, and persists the outcome.
//!
//! ## Error Semantics
//!
//! Deterministic business failures come back as `StoreError::Domain` and carry the
//! original [`DomainError`]. Everything else (lost connection, poisoned lock, rows
//! that violate invariants) is an infrastructure error and is never retried here.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use stockroom_auth::{PasswordResetToken, User};
use stockroom_core::{CategoryId, DomainError, ItemId, UserId};
use stockroom_ledger::catalog::name_key;
use stockroom_ledger::{
    Category, IssueOutcome, IssueStock, Item, Lot, ReceiveOutcome, ReceiveStock, StockTransaction, TransactionKind,
};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be read back into domain types.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Item listing filter.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive substring of the item name.
    pub q: Option<String>,
    pub category_id: Option<CategoryId>,
}

impl ItemFilter {
    pub(crate) fn needle(&self) -> Option<String> {
        needle(self.q.as_deref())
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(cat) = self.category_id {
            if item.category_id != cat {
                return false;
            }
        }
        match self.needle() {
            Some(n) => name_key(&item.name).contains(&n),
            None => true,
        }
    }
}

/// Audit-trail query filter. Dates are inclusive calendar days in UTC.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Case-insensitive match on item name or note.
    pub keyword: Option<String>,
    pub item_id: Option<ItemId>,
}

impl TransactionFilter {
    /// `[from, until)` bounds derived from the inclusive date range.
    pub fn window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let from = self.start.map(|d| d.and_time(NaiveTime::MIN).and_utc());
        let until = self
            .end
            .and_then(|d| d.succ_opt())
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());
        (from, until)
    }

    pub(crate) fn needle(&self) -> Option<String> {
        needle(self.keyword.as_deref())
    }

    pub fn matches(&self, tx: &StockTransaction, item_name: &str) -> bool {
        if self.kind.is_some_and(|k| k != tx.kind) {
            return false;
        }
        if self.item_id.is_some_and(|id| id != tx.item_id) {
            return false;
        }
        let (from, until) = self.window();
        if from.is_some_and(|f| tx.occurred_at < f) || until.is_some_and(|u| tx.occurred_at >= u) {
            return false;
        }
        match self.needle() {
            Some(n) => {
                name_key(item_name).contains(&n)
                    || tx.note.as_deref().is_some_and(|note| note.to_lowercase().contains(&n))
            }
            None => true,
        }
    }
}

fn needle(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
}

/// Categories and items.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Duplicate name (case-insensitive) is `Conflict`.
    async fn insert_category(&self, category: Category) -> StoreResult<Category>;

    /// Unknown id is `NotFound`; a name taken by another category is `Conflict`.
    async fn update_category(&self, category: Category) -> StoreResult<Category>;

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>>;

    /// Ordered by name.
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    /// Unknown category is `Validation`; duplicate name is `Conflict`.
    async fn insert_item(&self, item: Item) -> StoreResult<Item>;

    async fn update_item(&self, item: Item) -> StoreResult<Item>;

    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>>;

    /// Ordered by name.
    async fn list_items(&self, filter: &ItemFilter) -> StoreResult<Vec<Item>>;

    /// Items with any lot or transaction cannot be removed (`Conflict`).
    async fn delete_item(&self, id: ItemId) -> StoreResult<()>;
}

/// Lots and the append-only audit trail.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the lot and its receive transaction in one unit of work.
    /// Unknown item is `Validation`.
    async fn receive(&self, command: ReceiveStock) -> StoreResult<ReceiveOutcome>;

    /// Plan and apply a FIFO issue atomically. Concurrent issues on the same
    /// item serialize; a shortfall leaves every lot untouched.
    async fn issue(&self, command: IssueStock) -> StoreResult<IssueOutcome>;

    /// Lots of one item in FIFO order, depleted ones included.
    async fn lots_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Lot>>;

    async fn all_lots(&self) -> StoreResult<Vec<Lot>>;

    /// Newest first.
    async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<StockTransaction>>;
}

/// Accounts and password reset tokens.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Duplicate email is `Conflict`. With `only_if_empty` the insert happens only
    /// when no user exists yet (otherwise `Conflict`), checked atomically.
    async fn insert_user(&self, user: User, only_if_empty: bool) -> StoreResult<User>;

    async fn update_user(&self, user: User) -> StoreResult<User>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// `email` must already be normalized (trimmed, lowercase).
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Phone numbers are not unique; the oldest account holding `phone` wins.
    async fn find_user_by_phone(&self, phone: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn count_users(&self) -> StoreResult<u64>;

    async fn insert_reset_token(&self, token: PasswordResetToken) -> StoreResult<()>;

    async fn get_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>>;

    /// Mark the token used and store the new hash together. A token that is
    /// missing, used or expired at `now` is `Validation`.
    async fn redeem_reset_token(&self, token: &str, password_hash: String, now: DateTime<Utc>) -> StoreResult<()>;
}

/// Everything the application services need from one backend.
pub trait Store: CatalogStore + LedgerStore + UserStore {}

impl<T> Store for T where T: CatalogStore + LedgerStore + UserStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_core::{LotId, TransactionId};

    fn tx_at(at: DateTime<Utc>, kind: TransactionKind, note: Option<&str>) -> StockTransaction {
        let item = ItemId::new();
        match kind {
            TransactionKind::Receive => StockTransaction::receipt(
                TransactionId::new(),
                item,
                LotId::new(),
                5,
                at,
                UserId::new(),
                note.map(String::from),
            ),
            TransactionKind::Issue => StockTransaction::issue(
                TransactionId::new(),
                item,
                LotId::new(),
                5,
                at,
                UserId::new(),
                note.map(String::from),
            ),
        }
    }

    #[test]
    fn end_date_covers_the_whole_day() {
        let filter = TransactionFilter {
            start: NaiveDate::from_ymd_opt(2024, 3, 1),
            end: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();

        assert!(filter.matches(&tx_at(late, TransactionKind::Receive, None), "x"));
        assert!(!filter.matches(&tx_at(next, TransactionKind::Receive, None), "x"));
        assert!(!filter.matches(&tx_at(before, TransactionKind::Receive, None), "x"));
    }

    #[test]
    fn keyword_matches_item_name_or_note() {
        let filter = TransactionFilter {
            keyword: Some("  FLOUR ".into()),
            ..Default::default()
        };
        let now = Utc::now();
        assert!(filter.matches(&tx_at(now, TransactionKind::Issue, None), "Bread flour"));
        assert!(filter.matches(&tx_at(now, TransactionKind::Issue, Some("for flour bin")), "Sugar"));
        assert!(!filter.matches(&tx_at(now, TransactionKind::Issue, Some("misc")), "Sugar"));
    }

    #[test]
    fn kind_filter() {
        let filter = TransactionFilter {
            kind: Some(TransactionKind::Issue),
            ..Default::default()
        };
        let now = Utc::now();
        assert!(filter.matches(&tx_at(now, TransactionKind::Issue, None), "x"));
        assert!(!filter.matches(&tx_at(now, TransactionKind::Receive, None), "x"));
    }
}
