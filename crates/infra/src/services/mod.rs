//! Application services: the operations the API exposes, composed over a [`Store`].
//!
//! Services stamp commands with the current time, log the outcome and hand the
//! storage work to the backend. They hold no state of their own.

pub mod accounts;
pub mod catalog;
pub mod ledger;

use chrono::{DateTime, SubsecRound, Utc};

use stockroom_auth::PasswordError;

use crate::store::StoreError;

pub use accounts::Accounts;
pub use catalog::Catalog;
pub use ledger::{IssueRequest, ReceiveRequest, StockLedger, TransactionView};

/// Wall-clock time at the precision Postgres stores (microseconds), so values
/// read back compare equal to what was written.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl From<PasswordError> for StoreError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::Hash(msg) => StoreError::Unavailable(msg),
            PasswordError::CorruptHash(msg) => StoreError::Corrupt(msg),
        }
    }
}
