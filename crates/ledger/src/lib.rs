//! Stock ledger domain module.
//!
//! Business rules for the catalog, FIFO lots and the stock audit trail,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Storage backends load lots, call into this crate, and persist what it returns.

pub mod catalog;
pub mod commands;
pub mod fifo;
pub mod lot;
pub mod summary;
pub mod transaction;

pub use catalog::{Category, Item, ItemDraft, DEFAULT_UNIT};
pub use commands::{ConsumedLot, IssueOutcome, IssueStock, ReceiveStock, ReceiveOutcome};
pub use fifo::{IssueAllocation, fifo_order, plan_issue};
pub use lot::{Lot, total_remaining};
pub use summary::{Discrepancy, ItemSummary, reconcile, replay_on_hand, summarize_all};
pub use transaction::{StockTransaction, TransactionKind};
