use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockroom_core::{DomainError, ItemId, UserId};
use stockroom_ledger::{
    Discrepancy, IssueOutcome, IssueStock, Lot, ReceiveOutcome, ReceiveStock, StockTransaction, reconcile,
};

use crate::store::{ItemFilter, Store, StoreError, StoreResult, TransactionFilter};

use super::now;

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Audit-trail row with the item name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: StockTransaction,
    pub item_name: String,
}

/// Receive and issue stock; read the audit trail.
pub struct StockLedger<S: ?Sized = dyn Store> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store + ?Sized> StockLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(actor = %actor, item_id = %request.item_id, quantity = request.quantity))]
    pub async fn receive(&self, actor: UserId, request: ReceiveRequest) -> StoreResult<ReceiveOutcome> {
        let command = ReceiveStock {
            item_id: request.item_id,
            quantity: request.quantity,
            expiry: request.expiry,
            actor,
            note: request.note,
            occurred_at: now(),
        };
        command.validate()?;

        let outcome = self.store.receive(command).await?;
        info!(lot_id = %outcome.lot.id(), "stock received");
        Ok(outcome)
    }

    #[instrument(skip_all, fields(actor = %actor, item_id = %request.item_id, quantity = request.quantity))]
    pub async fn issue(&self, actor: UserId, request: IssueRequest) -> StoreResult<IssueOutcome> {
        let command = IssueStock {
            item_id: request.item_id,
            quantity: request.quantity,
            actor,
            note: request.note,
            occurred_at: now(),
        };
        command.validate()?;

        match self.store.issue(command).await {
            Ok(outcome) => {
                info!(lots = outcome.consumed.len(), taken = outcome.total_taken(), "stock issued");
                Ok(outcome)
            }
            Err(StoreError::Domain(DomainError::InsufficientStock { requested, available })) => {
                warn!(requested, available, "issue rejected: insufficient stock");
                Err(DomainError::insufficient_stock(requested, available).into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<TransactionView>> {
        let records = self.store.transactions(filter).await?;
        let names: HashMap<ItemId, String> = self
            .store
            .list_items(&ItemFilter::default())
            .await?
            .into_iter()
            .map(|i| (i.id, i.name))
            .collect();

        Ok(records
            .into_iter()
            .map(|transaction| TransactionView {
                item_name: names.get(&transaction.item_id).cloned().unwrap_or_default(),
                transaction,
            })
            .collect())
    }

    pub async fn all_lots(&self) -> StoreResult<Vec<Lot>> {
        self.store.all_lots().await
    }

    /// Replay the audit trail and compare it with lot balances.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> StoreResult<Vec<Discrepancy>> {
        let lots = self.store.all_lots().await?;
        let records = self.store.transactions(&TransactionFilter::default()).await?;
        let discrepancies = reconcile(&lots, &records)?;
        if discrepancies.is_empty() {
            info!(lots = lots.len(), transactions = records.len(), "ledger reconciled");
        } else {
            warn!(items = discrepancies.len(), "ledger discrepancies found");
        }
        Ok(discrepancies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stockroom_core::CategoryId;
    use stockroom_ledger::{Category, Item, ItemDraft, TransactionKind};

    use crate::store::{CatalogStore, InMemoryStore};

    async fn ledger_with_item() -> (StockLedger, ItemId) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let cat = store
            .insert_category(Category::new(CategoryId::new(), "Cleaning", now()).unwrap())
            .await
            .unwrap();
        let draft = ItemDraft {
            name: "Bleach".into(),
            category_id: cat.id,
            unit: Some("bottle".into()),
            reorder_threshold: 2,
        };
        let item = store.insert_item(Item::create(ItemId::new(), &draft, now()).unwrap()).await.unwrap();
        (StockLedger::new(store), item.id)
    }

    fn receive(item_id: ItemId, quantity: i64) -> ReceiveRequest {
        ReceiveRequest {
            item_id,
            quantity,
            expiry: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn replay_matches_lots_after_mixed_activity() {
        let (ledger, item) = ledger_with_item().await;
        let actor = UserId::new();

        ledger.receive(actor, receive(item, 10)).await.unwrap();
        ledger.receive(actor, receive(item, 5)).await.unwrap();
        ledger
            .issue(actor, IssueRequest { item_id: item, quantity: 12, note: Some("ward 3".into()) })
            .await
            .unwrap();
        let _ = ledger
            .issue(actor, IssueRequest { item_id: item, quantity: 50, note: None })
            .await
            .unwrap_err();

        assert!(ledger.reconcile().await.unwrap().is_empty());

        let on_hand: i64 = ledger.all_lots().await.unwrap().iter().map(Lot::remaining).sum();
        assert_eq!(on_hand, 3);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_storage() {
        let (ledger, item) = ledger_with_item().await;
        let err = ledger.receive(UserId::new(), receive(item, 0)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
        assert!(ledger.all_lots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transactions_carry_item_names_newest_first() {
        let (ledger, item) = ledger_with_item().await;
        let actor = UserId::new();
        ledger.receive(actor, receive(item, 4)).await.unwrap();
        ledger
            .issue(actor, IssueRequest { item_id: item, quantity: 1, note: None })
            .await
            .unwrap();

        let rows = ledger.transactions(&TransactionFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction.kind, TransactionKind::Issue);
        assert!(rows.iter().all(|r| r.item_name == "Bleach"));

        let receipts = ledger
            .transactions(&TransactionFilter {
                kind: Some(TransactionKind::Receive),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(receipts.len(), 1);
    }
}
