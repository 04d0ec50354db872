//! Postgres-backed store.
//!
//! Schema is applied at startup by [`PostgresStore::migrate`] (idempotent,
//! `CREATE ... IF NOT EXISTS`). The audit table is append-only at the database
//! level: a trigger rejects every `UPDATE` and `DELETE` on `stock_transactions`.
//!
//! ## Locking
//!
//! Receive and issue lock the item row (`FOR UPDATE`) first, then issue locks the
//! item's available lots in FIFO order. Two issues for the same item therefore
//! run one after the other, and an item cannot be deleted while stock moves.
//!
//! ## Error Mapping
//!
//! | Postgres code | StoreError |
//! |---------------|------------|
//! | `23505` unique violation | `Domain(Conflict)` |
//! | `23503` foreign key violation | `Domain(Validation)` |
//! | `23514` check violation | `Domain(Validation)` |
//! | `P0001` raised by trigger | `Domain(InvariantViolation)` |
//! | anything else | `Unavailable` |

use core::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use stockroom_auth::{PasswordResetToken, Role, User};
use stockroom_core::{CategoryId, DomainError, ItemId, LotId, TransactionId, UserId};
use stockroom_ledger::{
    Category, IssueOutcome, IssueStock, Item, Lot, ReceiveOutcome, ReceiveStock, StockTransaction, TransactionKind,
    catalog::name_key,
};

use super::{CatalogStore, ItemFilter, LedgerStore, StoreError, StoreResult, TransactionFilter, UserStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS categories_name_key ON categories (name_key);

CREATE TABLE IF NOT EXISTS items (
    id                 UUID PRIMARY KEY,
    name               TEXT NOT NULL,
    name_key           TEXT NOT NULL,
    category_id        UUID NOT NULL REFERENCES categories (id),
    unit               TEXT NOT NULL,
    reorder_threshold  BIGINT NOT NULL CHECK (reorder_threshold >= 0),
    created_at         TIMESTAMPTZ NOT NULL,
    updated_at         TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS items_name_key ON items (name_key);

CREATE TABLE IF NOT EXISTS lots (
    id           UUID PRIMARY KEY,
    item_id      UUID NOT NULL REFERENCES items (id) ON DELETE RESTRICT,
    received     BIGINT NOT NULL CHECK (received > 0),
    remaining    BIGINT NOT NULL CHECK (remaining >= 0 AND remaining <= received),
    expiry       DATE,
    received_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS lots_fifo ON lots (item_id, received_at, id);

CREATE TABLE IF NOT EXISTS users (
    id             UUID PRIMARY KEY,
    email          TEXT NOT NULL,
    name           TEXT NOT NULL,
    phone          TEXT,
    password_hash  TEXT NOT NULL,
    role           TEXT NOT NULL CHECK (role IN ('admin', 'staff')),
    created_at     TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (email);

CREATE TABLE IF NOT EXISTS stock_transactions (
    id           UUID PRIMARY KEY,
    kind         TEXT NOT NULL CHECK (kind IN ('receive', 'issue')),
    item_id      UUID NOT NULL REFERENCES items (id) ON DELETE RESTRICT,
    lot_id       UUID NOT NULL REFERENCES lots (id) ON DELETE RESTRICT,
    quantity     BIGINT NOT NULL CHECK (
                     (kind = 'receive' AND quantity > 0) OR (kind = 'issue' AND quantity < 0)
                 ),
    occurred_at  TIMESTAMPTZ NOT NULL,
    actor        UUID NOT NULL REFERENCES users (id),
    note         TEXT
);
CREATE INDEX IF NOT EXISTS stock_transactions_occurred ON stock_transactions (occurred_at DESC);
CREATE INDEX IF NOT EXISTS stock_transactions_item ON stock_transactions (item_id);

CREATE OR REPLACE FUNCTION stock_transactions_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'stock_transactions is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS stock_transactions_no_mutation ON stock_transactions;
CREATE TRIGGER stock_transactions_no_mutation
    BEFORE UPDATE OR DELETE ON stock_transactions
    FOR EACH ROW EXECUTE FUNCTION stock_transactions_append_only();

CREATE TABLE IF NOT EXISTS password_reset_tokens (
    token       TEXT PRIMARY KEY,
    user_id     UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    expires_at  TIMESTAMPTZ NOT NULL,
    used        BOOLEAN NOT NULL DEFAULT FALSE
);
"#;

const LOT_COLUMNS: &str = "id, item_id, received, remaining, expiry, received_at";
const TX_COLUMNS: &str = "t.id, t.kind, t.item_id, t.lot_id, t.quantity, t.occurred_at, t.actor, t.note";
const USER_COLUMNS: &str = "id, email, name, phone, password_hash, role, created_at";
const ITEM_COLUMNS: &str = "id, name, category_id, unit, reorder_threshold, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Safe to run on every startup.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StoreResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        sqlx::query("INSERT INTO categories (id, name, name_key, created_at) VALUES ($1, $2, $3, $4)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(name_key(&category.name))
            .bind(category.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(category)
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn update_category(&self, category: Category) -> StoreResult<Category> {
        let done = sqlx::query("UPDATE categories SET name = $2, name_key = $3 WHERE id = $1")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(name_key(&category.name))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_category", e))?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found().into());
        }
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name, created_at FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM categories ORDER BY name_key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;
        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&self, item: Item) -> StoreResult<Item> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, name_key, category_id, unit, reorder_threshold, created_at, updated_at)
            VALUES ($1, $2, $8, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category_id.as_uuid())
        .bind(&item.unit)
        .bind(item.reorder_threshold)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(name_key(&item.name))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(item)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn update_item(&self, item: Item) -> StoreResult<Item> {
        let done = sqlx::query(
            r#"
            UPDATE items
            SET name = $2, category_id = $3, unit = $4, reorder_threshold = $5, updated_at = $6, name_key = $7
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category_id.as_uuid())
        .bind(&item.unit)
        .bind(item.reorder_threshold)
        .bind(item.updated_at)
        .bind(name_key(&item.name))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found().into());
        }
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items(&self, filter: &ItemFilter) -> StoreResult<Vec<Item>> {
        let category: Option<Uuid> = filter.category_id.map(Uuid::from);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE ($1::text IS NULL OR strpos(name_key, $1) > 0)
                AND ($2::uuid IS NULL OR category_id = $2)
            ORDER BY name_key
            "#
        ))
        .bind(filter.needle())
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete_item(&self, id: ItemId) -> StoreResult<()> {
        let mut tx = self.begin("delete_item").await?;

        lock_item(&mut tx, id, "delete_item")
            .await?
            .ok_or(StoreError::Domain(DomainError::NotFound))?;

        let has_history: bool = sqlx::query(
            r#"
            SELECT EXISTS (SELECT 1 FROM lots WHERE item_id = $1)
                OR EXISTS (SELECT 1 FROM stock_transactions WHERE item_id = $1) AS has_history
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("has_history"))
        .map_err(|e| map_sqlx_error("delete_item", e))?;

        if has_history {
            return Err(DomainError::conflict("item has stock history and cannot be deleted").into());
        }

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("delete_item", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self, command), fields(item_id = %command.item_id, quantity = command.quantity), err)]
    async fn receive(&self, command: ReceiveStock) -> StoreResult<ReceiveOutcome> {
        let mut tx = self.begin("receive").await?;

        if lock_item(&mut tx, command.item_id, "receive").await?.is_none() {
            return Err(DomainError::validation(format!("unknown item {}", command.item_id)).into());
        }

        // The item row lock serializes receipts, so the balance read here stays current.
        let rows = sqlx::query(&format!("SELECT {LOT_COLUMNS} FROM lots WHERE item_id = $1 AND remaining > 0"))
            .bind(command.item_id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("receive", e))?;
        let lots = rows.iter().map(lot_from_row).collect::<StoreResult<Vec<Lot>>>()?;
        command.check_capacity(&lots)?;

        let outcome = command.execute(LotId::new(), TransactionId::new())?;
        let lot = &outcome.lot;

        sqlx::query(&format!("INSERT INTO lots ({LOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"))
            .bind(lot.id().as_uuid())
            .bind(lot.item_id().as_uuid())
            .bind(lot.received())
            .bind(lot.remaining())
            .bind(lot.expiry())
            .bind(lot.received_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("receive", e))?;

        insert_transaction(&mut tx, &outcome.transaction).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("receive", e))?;
        Ok(outcome)
    }

    #[instrument(skip(self, command), fields(item_id = %command.item_id, quantity = command.quantity), err)]
    async fn issue(&self, command: IssueStock) -> StoreResult<IssueOutcome> {
        let mut tx = self.begin("issue").await?;

        if lock_item(&mut tx, command.item_id, "issue").await?.is_none() {
            return Err(DomainError::validation(format!("unknown item {}", command.item_id)).into());
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM lots
            WHERE item_id = $1 AND remaining > 0
            ORDER BY received_at ASC, id ASC
            FOR UPDATE
            "#
        ))
        .bind(command.item_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("issue", e))?;
        let lots = rows.iter().map(lot_from_row).collect::<StoreResult<Vec<Lot>>>()?;

        // On error the transaction is dropped and rolled back; nothing was written.
        let outcome = command.execute(&lots, TransactionId::new)?;

        for consumed in &outcome.consumed {
            sqlx::query("UPDATE lots SET remaining = $2 WHERE id = $1")
                .bind(consumed.lot.id().as_uuid())
                .bind(consumed.lot.remaining())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("issue", e))?;
        }
        for record in &outcome.transactions {
            insert_transaction(&mut tx, record).await?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("issue", e))?;
        Ok(outcome)
    }

    async fn lots_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Lot>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE item_id = $1 ORDER BY received_at ASC, id ASC"
        ))
        .bind(item_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("lots_for_item", e))?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn all_lots(&self) -> StoreResult<Vec<Lot>> {
        let rows = sqlx::query(&format!("SELECT {LOT_COLUMNS} FROM lots ORDER BY received_at ASC, id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_lots", e))?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<StockTransaction>> {
        let (from, until) = filter.window();
        let item: Option<Uuid> = filter.item_id.map(Uuid::from);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TX_COLUMNS}
            FROM stock_transactions t
            JOIN items i ON i.id = t.item_id
            WHERE ($1::text IS NULL OR t.kind = $1)
                AND ($2::uuid IS NULL OR t.item_id = $2)
                AND ($3::timestamptz IS NULL OR t.occurred_at >= $3)
                AND ($4::timestamptz IS NULL OR t.occurred_at < $4)
                AND ($5::text IS NULL
                     OR strpos(i.name_key, $5) > 0
                     OR strpos(lower(coalesce(t.note, '')), $5) > 0)
            ORDER BY t.occurred_at DESC, t.id DESC
            "#
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(item)
        .bind(from)
        .bind(until)
        .bind(filter.needle())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: User, only_if_empty: bool) -> StoreResult<User> {
        let mut tx = self.begin("insert_user").await?;

        if only_if_empty {
            // Blocks concurrent inserts until commit so two bootstraps cannot both see zero.
            sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_user", e))?;
            if count_users(&mut tx).await? > 0 {
                return Err(DomainError::conflict("system already initialized").into());
            }
        }

        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update_user(&self, user: User) -> StoreResult<User> {
        let done = sqlx::query(
            "UPDATE users SET email = $2, name = $3, phone = $4, password_hash = $5, role = $6 WHERE id = $1",
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found().into());
        }
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1 ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_phone", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;
        count_users(&mut conn).await
    }

    async fn insert_reset_token(&self, token: PasswordResetToken) -> StoreResult<()> {
        sqlx::query("INSERT INTO password_reset_tokens (token, user_id, expires_at, used) VALUES ($1, $2, $3, $4)")
            .bind(&token.token)
            .bind(token.user_id.as_uuid())
            .bind(token.expires_at)
            .bind(token.used)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_reset_token", e))?;
        Ok(())
    }

    async fn get_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        let row = sqlx::query("SELECT token, user_id, expires_at, used FROM password_reset_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_reset_token", e))?;
        row.as_ref().map(reset_token_from_row).transpose()
    }

    #[instrument(skip_all, err)]
    async fn redeem_reset_token(&self, token: &str, password_hash: String, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.begin("redeem_reset_token").await?;

        let row = sqlx::query(
            "SELECT token, user_id, expires_at, used FROM password_reset_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("redeem_reset_token", e))?;

        let record = match row.as_ref().map(reset_token_from_row).transpose()? {
            Some(t) if t.is_usable(now) => t,
            _ => return Err(DomainError::validation("reset token is invalid or expired").into()),
        };

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(record.user_id.as_uuid())
            .bind(&password_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("redeem_reset_token", e))?;
        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("redeem_reset_token", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("redeem_reset_token", e))
    }
}

async fn lock_item(conn: &mut PgConnection, id: ItemId, operation: &str) -> StoreResult<Option<()>> {
    let row = sqlx::query("SELECT id FROM items WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(row.map(|_| ()))
}

async fn count_users(conn: &mut PgConnection) -> StoreResult<u64> {
    let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(conn)
        .await
        .and_then(|row| row.try_get("n"))
        .map_err(|e| map_sqlx_error("count_users", e))?;
    Ok(n.max(0) as u64)
}

async fn insert_transaction(conn: &mut PgConnection, record: &StockTransaction) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_transactions (id, kind, item_id, lot_id, quantity, occurred_at, actor, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.item_id.as_uuid())
    .bind(record.lot_id.as_uuid())
    .bind(record.quantity)
    .bind(record.occurred_at)
    .bind(record.actor.as_uuid())
    .bind(&record.note)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(())
}

fn corrupt(what: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Corrupt(format!("failed to read {what} row: {e}"))
}

fn category_from_row(row: &PgRow) -> StoreResult<Category> {
    let read = || -> Result<Category, sqlx::Error> {
        Ok(Category {
            id: CategoryId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    };
    read().map_err(corrupt("category"))
}

fn item_from_row(row: &PgRow) -> StoreResult<Item> {
    let read = || -> Result<Item, sqlx::Error> {
        Ok(Item {
            id: ItemId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            category_id: CategoryId::from_uuid(row.try_get("category_id")?),
            unit: row.try_get("unit")?,
            reorder_threshold: row.try_get("reorder_threshold")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    read().map_err(corrupt("item"))
}

fn lot_from_row(row: &PgRow) -> StoreResult<Lot> {
    let read = || -> Result<(Uuid, Uuid, i64, i64, Option<NaiveDate>, DateTime<Utc>), sqlx::Error> {
        Ok((
            row.try_get("id")?,
            row.try_get("item_id")?,
            row.try_get("received")?,
            row.try_get("remaining")?,
            row.try_get("expiry")?,
            row.try_get("received_at")?,
        ))
    };
    let (id, item_id, received, remaining, expiry, received_at) = read().map_err(corrupt("lot"))?;
    Lot::restore(
        LotId::from_uuid(id),
        ItemId::from_uuid(item_id),
        received,
        remaining,
        expiry,
        received_at,
    )
    .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn transaction_from_row(row: &PgRow) -> StoreResult<StockTransaction> {
    let read = || -> Result<(StockTransaction, String), sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok((
            StockTransaction {
                id: TransactionId::from_uuid(row.try_get("id")?),
                // Placeholder until `kind` is parsed below.
                kind: TransactionKind::Receive,
                item_id: ItemId::from_uuid(row.try_get("item_id")?),
                lot_id: LotId::from_uuid(row.try_get("lot_id")?),
                quantity: row.try_get("quantity")?,
                occurred_at: row.try_get("occurred_at")?,
                actor: UserId::from_uuid(row.try_get("actor")?),
                note: row.try_get("note")?,
            },
            kind,
        ))
    };
    let (mut record, kind) = read().map_err(corrupt("transaction"))?;
    record.kind = TransactionKind::from_str(&kind).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(record)
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let read = || -> Result<(User, String), sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok((
            User {
                id: UserId::from_uuid(row.try_get("id")?),
                email: row.try_get("email")?,
                name: row.try_get("name")?,
                phone: row.try_get("phone")?,
                password_hash: row.try_get("password_hash")?,
                role: Role::Staff,
                created_at: row.try_get("created_at")?,
            },
            role,
        ))
    };
    let (mut user, role) = read().map_err(corrupt("user"))?;
    user.role = Role::from_str(&role).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(user)
}

fn reset_token_from_row(row: &PgRow) -> StoreResult<PasswordResetToken> {
    let read = || -> Result<PasswordResetToken, sqlx::Error> {
        Ok(PasswordResetToken {
            token: row.try_get("token")?,
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            expires_at: row.try_get("expires_at")?,
            used: row.try_get("used")?,
        })
    };
    read().map_err(corrupt("password reset token"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(match db_err.constraint() {
                    Some(c) if c.contains("name") => "name already in use".to_string(),
                    Some(c) if c.contains("email") => "email already registered".to_string(),
                    _ => msg,
                })
                .into(),
                Some("23503") => DomainError::validation(format!("{operation}: referenced record does not exist")).into(),
                Some("23514") => DomainError::validation(msg).into(),
                Some("P0001") => DomainError::invariant(msg).into(),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("{operation}: {err}")),
    }
}
