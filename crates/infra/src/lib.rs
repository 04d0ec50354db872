//! Infrastructure layer: storage backends, application services, CSV export and mail.

pub mod export;
pub mod mailer;
pub mod services;
pub mod store;

pub use mailer::{LogMailer, MailError, Mailer, OutgoingMail, SmtpConfig, SmtpMailer};
pub use services::{Accounts, Catalog, IssueRequest, ReceiveRequest, StockLedger, TransactionView};
pub use store::{
    CatalogStore, InMemoryStore, ItemFilter, LedgerStore, PostgresStore, Store, StoreError, StoreResult,
    TransactionFilter, UserStore,
};
