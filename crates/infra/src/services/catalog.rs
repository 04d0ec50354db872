use std::sync::Arc;

use tracing::{info, instrument};

use stockroom_core::{CategoryId, DomainError, ItemId};
use stockroom_ledger::{Category, Item, ItemDraft, ItemSummary, Lot, summarize_all};

use crate::store::{ItemFilter, Store, StoreResult, TransactionFilter};

use super::now;

/// Categories, items and the per-item stock summaries built from lots.
pub struct Catalog<S: ?Sized = dyn Store> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store + ?Sized> Catalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> StoreResult<Category> {
        let category = Category::new(CategoryId::new(), name, now())?;
        let category = self.store.insert_category(category).await?;
        info!(category_id = %category.id, "category created");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> StoreResult<Category> {
        let mut category = self.store.get_category(id).await?.ok_or(DomainError::NotFound)?;
        category.rename(name)?;
        self.store.update_category(category).await
    }

    pub async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.store.list_categories().await
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_item(&self, draft: &ItemDraft) -> StoreResult<Item> {
        self.require_category(draft.category_id).await?;
        let item = Item::create(ItemId::new(), draft, now())?;
        let item = self.store.insert_item(item).await?;
        info!(item_id = %item.id, "item created");
        Ok(item)
    }

    #[instrument(skip(self, draft), fields(item_id = %id))]
    pub async fn update_item(&self, id: ItemId, draft: &ItemDraft) -> StoreResult<Item> {
        let mut item = self.store.get_item(id).await?.ok_or(DomainError::NotFound)?;
        self.require_category(draft.category_id).await?;
        item.revise(draft, now())?;
        self.store.update_item(item).await
    }

    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn delete_item(&self, id: ItemId) -> StoreResult<()> {
        self.store.delete_item(id).await?;
        info!("item deleted");
        Ok(())
    }

    pub async fn item(&self, id: ItemId) -> StoreResult<ItemSummary> {
        let item = self.store.get_item(id).await?.ok_or(DomainError::NotFound)?;
        let categories = self.store.list_categories().await?;
        let lots = self.store.lots_for_item(id).await?;
        let history = self
            .store
            .transactions(&TransactionFilter {
                item_id: Some(id),
                ..Default::default()
            })
            .await?;

        summarize_all(&[item], &categories, &lots, &history)?
            .pop()
            .ok_or_else(|| DomainError::invariant("summary missing for loaded item").into())
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> StoreResult<Vec<ItemSummary>> {
        let items = self.store.list_items(filter).await?;
        let categories = self.store.list_categories().await?;
        let lots = self.store.all_lots().await?;
        let history = self.store.transactions(&TransactionFilter::default()).await?;
        Ok(summarize_all(&items, &categories, &lots, &history)?)
    }

    /// Lots of one item in FIFO order.
    pub async fn item_lots(&self, id: ItemId) -> StoreResult<Vec<Lot>> {
        if self.store.get_item(id).await?.is_none() {
            return Err(DomainError::NotFound.into());
        }
        self.store.lots_for_item(id).await
    }

    async fn require_category(&self, id: CategoryId) -> StoreResult<()> {
        match self.store.get_category(id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!("unknown category {id}")).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stockroom_core::UserId;

    use crate::services::{ReceiveRequest, StockLedger};
    use crate::store::InMemoryStore;

    fn services() -> (Catalog, StockLedger) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        (Catalog::new(Arc::clone(&store)), StockLedger::new(store))
    }

    fn draft(name: &str, category_id: CategoryId, threshold: i64) -> ItemDraft {
        ItemDraft {
            name: name.into(),
            category_id,
            unit: None,
            reorder_threshold: threshold,
        }
    }

    #[tokio::test]
    async fn item_requires_known_category() {
        let (catalog, _) = services();
        let err = catalog.create_item(&draft("Soap", CategoryId::new(), 0)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn duplicate_category_name_conflicts() {
        let (catalog, _) = services();
        catalog.create_category("Produce").await.unwrap();
        let err = catalog.create_category("  produce ").await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn summaries_reflect_stock_and_reorder_level() {
        let (catalog, ledger) = services();
        let cat = catalog.create_category("Produce").await.unwrap();
        let apples = catalog.create_item(&draft("Apples", cat.id, 5)).await.unwrap();
        let pears = catalog.create_item(&draft("Pears", cat.id, 5)).await.unwrap();

        ledger
            .receive(
                UserId::new(),
                ReceiveRequest {
                    item_id: apples.id,
                    quantity: 20,
                    expiry: None,
                    note: None,
                },
            )
            .await
            .unwrap();

        let rows = catalog.list_items(&ItemFilter::default()).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Apples", "Pears"]);
        assert_eq!(rows[0].on_hand, 20);
        assert!(!rows[0].below_reorder);
        assert_eq!(rows[1].on_hand, 0);
        assert!(rows[1].below_reorder);
        assert_eq!(rows[0].unit, "unit");
        assert_eq!(rows[0].category.as_deref(), Some("Produce"));

        let one = catalog.item(pears.id).await.unwrap();
        assert_eq!(one.id, pears.id);

        let filtered = catalog
            .list_items(&ItemFilter {
                q: Some("PEA".into()),
                category_id: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn unused_item_can_be_deleted() {
        let (catalog, _) = services();
        let cat = catalog.create_category("Misc").await.unwrap();
        let item = catalog.create_item(&draft("Tape", cat.id, 0)).await.unwrap();

        catalog.delete_item(item.id).await.unwrap();
        let err = catalog.item(item.id).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::NotFound));
    }
}
