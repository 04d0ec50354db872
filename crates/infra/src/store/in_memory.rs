use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_auth::{PasswordResetToken, User};
use stockroom_core::{CategoryId, DomainError, ItemId, LotId, TransactionId, UserId};
use stockroom_ledger::catalog::{name_key, names_collide};
use stockroom_ledger::{
    Category, IssueOutcome, IssueStock, Item, Lot, ReceiveOutcome, ReceiveStock, StockTransaction, fifo_order,
};

use super::{CatalogStore, ItemFilter, LedgerStore, StoreError, StoreResult, TransactionFilter, UserStore};

#[derive(Debug, Default)]
struct State {
    categories: HashMap<CategoryId, Category>,
    items: HashMap<ItemId, Item>,
    lots: HashMap<LotId, Lot>,
    /// Append-only, in commit order.
    transactions: Vec<StockTransaction>,
    users: HashMap<UserId, User>,
    reset_tokens: HashMap<String, PasswordResetToken>,
}

impl State {
    fn item_lots(&self, item_id: ItemId) -> Vec<Lot> {
        let mut lots: Vec<Lot> = self.lots.values().filter(|l| l.item_id() == item_id).cloned().collect();
        fifo_order(&mut lots);
        lots
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

/// In-memory store for dev and tests.
///
/// A single `RwLock` guards all state, so each mutation (including FIFO
/// plan + apply) is atomic with respect to every other operation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        let mut state = self.write()?;
        if state.categories.values().any(|c| names_collide(&c.name, &category.name)) {
            return Err(DomainError::conflict(format!("category '{}' already exists", category.name)).into());
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: Category) -> StoreResult<Category> {
        let mut state = self.write()?;
        if !state.categories.contains_key(&category.id) {
            return Err(DomainError::not_found().into());
        }
        if state
            .categories
            .values()
            .any(|c| c.id != category.id && names_collide(&c.name, &category.name))
        {
            return Err(DomainError::conflict(format!("category '{}' already exists", category.name)).into());
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut out: Vec<Category> = self.read()?.categories.values().cloned().collect();
        out.sort_by_key(|c| name_key(&c.name));
        Ok(out)
    }

    async fn insert_item(&self, item: Item) -> StoreResult<Item> {
        let mut state = self.write()?;
        if !state.categories.contains_key(&item.category_id) {
            return Err(DomainError::validation(format!("unknown category {}", item.category_id)).into());
        }
        if state.items.values().any(|i| names_collide(&i.name, &item.name)) {
            return Err(DomainError::conflict(format!("item '{}' already exists", item.name)).into());
        }
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_item(&self, item: Item) -> StoreResult<Item> {
        let mut state = self.write()?;
        if !state.items.contains_key(&item.id) {
            return Err(DomainError::not_found().into());
        }
        if !state.categories.contains_key(&item.category_id) {
            return Err(DomainError::validation(format!("unknown category {}", item.category_id)).into());
        }
        if state
            .items
            .values()
            .any(|i| i.id != item.id && names_collide(&i.name, &item.name))
        {
            return Err(DomainError::conflict(format!("item '{}' already exists", item.name)).into());
        }
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn list_items(&self, filter: &ItemFilter) -> StoreResult<Vec<Item>> {
        let mut out: Vec<Item> = self
            .read()?
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        out.sort_by_key(|i| name_key(&i.name));
        Ok(out)
    }

    async fn delete_item(&self, id: ItemId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.items.contains_key(&id) {
            return Err(DomainError::not_found().into());
        }
        let has_history =
            state.lots.values().any(|l| l.item_id() == id) || state.transactions.iter().any(|t| t.item_id == id);
        if has_history {
            return Err(DomainError::conflict("item has stock history and cannot be deleted").into());
        }
        state.items.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn receive(&self, command: ReceiveStock) -> StoreResult<ReceiveOutcome> {
        let mut state = self.write()?;
        if !state.items.contains_key(&command.item_id) {
            return Err(DomainError::validation(format!("unknown item {}", command.item_id)).into());
        }
        command.check_capacity(&state.item_lots(command.item_id))?;

        let outcome = command.execute(LotId::new(), TransactionId::new())?;
        state.lots.insert(outcome.lot.id(), outcome.lot.clone());
        state.transactions.push(outcome.transaction.clone());
        Ok(outcome)
    }

    async fn issue(&self, command: IssueStock) -> StoreResult<IssueOutcome> {
        // Held for plan and apply.
        let mut state = self.write()?;
        if !state.items.contains_key(&command.item_id) {
            return Err(DomainError::validation(format!("unknown item {}", command.item_id)).into());
        }

        let lots = state.item_lots(command.item_id);
        let outcome = command.execute(&lots, TransactionId::new)?;

        for consumed in &outcome.consumed {
            state.lots.insert(consumed.lot.id(), consumed.lot.clone());
        }
        state.transactions.extend(outcome.transactions.iter().cloned());
        Ok(outcome)
    }

    async fn lots_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Lot>> {
        Ok(self.read()?.item_lots(item_id))
    }

    async fn all_lots(&self) -> StoreResult<Vec<Lot>> {
        let mut lots: Vec<Lot> = self.read()?.lots.values().cloned().collect();
        fifo_order(&mut lots);
        Ok(lots)
    }

    async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<StockTransaction>> {
        let state = self.read()?;
        let mut out: Vec<StockTransaction> = state
            .transactions
            .iter()
            .filter(|tx| {
                let name = state.items.get(&tx.item_id).map(|i| i.name.as_str()).unwrap_or("");
                filter.matches(tx, name)
            })
            .cloned()
            .collect();
        // Stable sort keeps commit order among equal timestamps; reverse gives newest first.
        out.sort_by_key(|tx| tx.occurred_at);
        out.reverse();
        Ok(out)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: User, only_if_empty: bool) -> StoreResult<User> {
        let mut state = self.write()?;
        if only_if_empty && !state.users.is_empty() {
            return Err(DomainError::conflict("system already initialized").into());
        }
        if state.email_taken(&user.email, None) {
            return Err(DomainError::conflict(format!("email '{}' already registered", user.email)).into());
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) {
            return Err(DomainError::not_found().into());
        }
        if state.email_taken(&user.email, Some(user.id)) {
            return Err(DomainError::conflict(format!("email '{}' already registered", user.email)).into());
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .filter(|u| u.phone.as_deref() == Some(phone))
            .min_by_key(|u| (u.created_at, u.id))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.read()?.users.len() as u64)
    }

    async fn insert_reset_token(&self, token: PasswordResetToken) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&token.user_id) {
            return Err(DomainError::not_found().into());
        }
        state.reset_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(self.read()?.reset_tokens.get(token).cloned())
    }

    async fn redeem_reset_token(&self, token: &str, password_hash: String, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.write()?;
        let user_id = match state.reset_tokens.get(token) {
            Some(t) if t.is_usable(now) => t.user_id,
            _ => return Err(DomainError::validation("reset token is invalid or expired").into()),
        };
        let Some(user) = state.users.get_mut(&user_id) else {
            return Err(DomainError::validation("reset token is invalid or expired").into());
        };
        user.password_hash = password_hash;
        if let Some(t) = state.reset_tokens.get_mut(token) {
            t.used = true;
        }
        Ok(())
    }
}
