//! Postgres-backed implementation of the product store.
//!
//! # What this module is
//! The durable backend for the catalog and the reservation engine. Stock
//! mutations are single conditional UPDATE statements; the database's row
//! locks serialize writers touching the same SKU, and the statement guards
//! (`quantity - reserved >= amount`, `reserved >= amount`, `version = $n`)
//! keep the `quantity >= reserved >= 0` invariant unconditionally true at
//! rest.
//!
//! # Zero rows affected
//! A guarded UPDATE that matches nothing means either a failed guard or a
//! concurrent writer. Each call site disambiguates by re-reading the row
//! before reporting `InsufficientStock` / `OptimisticLockConflict` /
//! `ReservationNotPending` versus plain not-found.
//!
//! # Expirer support
//! `find_expired_pending` uses `FOR UPDATE SKIP LOCKED` so multiple expirer
//! workers partition the expired set instead of blocking on each other.
//!
//! # Operational notes
//! - Migrations are embedded via `sqlx::migrate!` and run before serving;
//!   a failed migration fails startup.
//! - Pool `acquire_timeout` bounds how long a request waits for a
//!   connection; hanging indefinitely on a sick database is worse than
//!   failing fast.
//! - All tables soft-delete via `deleted_at`; reads and guards filter on it.
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::domain::{DomainError, Inventory, Product, Reservation, ReservationStatus, Sku};

use super::{ProductStore, StoreResult, StoreTx};

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct DbProduct {
    id: Uuid,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DbSku {
    id: Uuid,
    product_id: Uuid,
    code: String,
    price_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DbInventory {
    sku_id: Uuid,
    quantity: i64,
    reserved: i64,
    version: i64,
}

#[derive(Debug, FromRow)]
struct DbReservation {
    id: Uuid,
    status: i16,
    items: serde_json::Value,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PostgresStore {
    /// Connect, run migrations, and hand back a ready store.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(&pg.url).map_err(|e| anyhow!(e))?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(|e| anyhow!(e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| anyhow!(e))?;

        Ok(Self { pool })
    }
}

struct PostgresTx {
    // sqlx rolls the transaction back on drop unless committed.
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx {
    async fn read_inventory(&mut self, sku_id: Uuid) -> StoreResult<Option<DbInventory>> {
        let row = sqlx::query_as::<_, DbInventory>(
            r#"SELECT sku_id, quantity, reserved, version
               FROM inventory WHERE sku_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(sku_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row)
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn reserve_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE inventory
               SET reserved = reserved + $2, version = version + 1, updated_at = NOW()
               WHERE sku_id = $1 AND deleted_at IS NULL AND quantity - reserved >= $2"#,
        )
        .bind(sku_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            // Inside the transaction the row is locked, so a miss is either
            // an unknown SKU or a genuine stock shortfall.
            return match self.read_inventory(sku_id).await? {
                None => Err(DomainError::InventoryNotFound),
                Some(_) => Err(DomainError::InsufficientStock),
            };
        }
        Ok(())
    }

    async fn confirm_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE inventory
               SET quantity = quantity - $2, reserved = reserved - $2,
                   version = version + 1, updated_at = NOW()
               WHERE sku_id = $1 AND deleted_at IS NULL AND reserved >= $2"#,
        )
        .bind(sku_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            return match self.read_inventory(sku_id).await? {
                None => Err(DomainError::InventoryNotFound),
                Some(_) => Err(DomainError::InvalidReserved),
            };
        }
        Ok(())
    }

    async fn release_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE inventory
               SET reserved = reserved - $2, version = version + 1, updated_at = NOW()
               WHERE sku_id = $1 AND deleted_at IS NULL AND reserved >= $2"#,
        )
        .bind(sku_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            return match self.read_inventory(sku_id).await? {
                None => Err(DomainError::InventoryNotFound),
                Some(_) => Err(DomainError::InvalidReserved),
            };
        }
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        let items = serde_json::to_value(&reservation.items).map_err(|e| anyhow!(e))?;
        sqlx::query(
            r#"INSERT INTO reservations (id, status, items, expires_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(reservation.id)
        .bind(reservation.status.code())
        .bind(items)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE reservations
               SET status = $2, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL AND status = $3"#,
        )
        .bind(id)
        .bind(status.code())
        .bind(ReservationStatus::Pending.code())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM reservations WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| anyhow!(e))?
                > 0;
            return if exists {
                Err(DomainError::ReservationNotPending)
            } else {
                Err(DomainError::ReservationNotFound)
            };
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.rollback().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO products (id, name, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, DbProduct>(
            r#"SELECT id, name, description, created_at, updated_at
               FROM products WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or(DomainError::ProductNotFound)?;
        Ok(product_from_row(row))
    }

    async fn list_products(&self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, DbProduct>(
            r#"SELECT id, name, description, created_at, updated_at
               FROM products WHERE deleted_at IS NULL
               ORDER BY created_at, id
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(product_from_row).collect())
    }

    async fn create_sku(&self, sku: &Sku) -> StoreResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO skus (id, product_id, code, price_cents, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(sku.id)
        .bind(sku.product_id)
        .bind(&sku.code)
        .bind(sku.price_cents)
        .bind(sku.created_at)
        .bind(sku.updated_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(DomainError::SkuCodeExists),
            Err(err) => Err(anyhow!(err).into()),
        }
    }

    async fn get_sku(&self, id: Uuid) -> StoreResult<Sku> {
        let row = sqlx::query_as::<_, DbSku>(
            r#"SELECT id, product_id, code, price_cents, created_at, updated_at
               FROM skus WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or(DomainError::SkuNotFound)?;
        Ok(sku_from_row(row))
    }

    async fn create_inventory(&self, inventory: &Inventory) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO inventory (sku_id, quantity, reserved, version, created_at, updated_at)
               VALUES ($1, $2, $3, $4, NOW(), NOW())"#,
        )
        .bind(inventory.sku_id)
        .bind(inventory.quantity)
        .bind(inventory.reserved)
        .bind(inventory.version)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_inventory(&self, sku_id: Uuid) -> StoreResult<Inventory> {
        let row = sqlx::query_as::<_, DbInventory>(
            r#"SELECT sku_id, quantity, reserved, version
               FROM inventory WHERE sku_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or(DomainError::InventoryNotFound)?;
        Ok(inventory_from_row(row))
    }

    async fn reserve_with_version(
        &self,
        sku_id: Uuid,
        amount: i64,
        expected_version: i64,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE inventory
               SET reserved = reserved + $2, version = version + 1, updated_at = NOW()
               WHERE sku_id = $1 AND deleted_at IS NULL
                 AND version = $3 AND quantity - reserved >= $2"#,
        )
        .bind(sku_id)
        .bind(amount)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            // Re-read to tell a version conflict from a stock shortfall.
            let current = self.get_inventory(sku_id).await?;
            if current.version != expected_version {
                return Err(DomainError::OptimisticLockConflict);
            }
            return Err(DomainError::InsufficientStock);
        }
        Ok(())
    }

    async fn set_quantity(&self, sku_id: Uuid, quantity: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE inventory
               SET quantity = $2, version = version + 1, updated_at = NOW()
               WHERE sku_id = $1 AND deleted_at IS NULL AND $2 >= reserved"#,
        )
        .bind(sku_id)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a quantity below the holds.
            self.get_inventory(sku_id).await?;
            return Err(DomainError::InsufficientStock);
        }
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Reservation> {
        let row = sqlx::query_as::<_, DbReservation>(
            r#"SELECT id, status, items, expires_at, created_at, updated_at
               FROM reservations WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or(DomainError::ReservationNotFound)?;
        reservation_from_row(row)
    }

    async fn find_expired_pending(&self, limit: i64) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, DbReservation>(
            r#"SELECT id, status, items, expires_at, created_at, updated_at
               FROM reservations
               WHERE status = $1 AND expires_at < NOW() AND deleted_at IS NULL
               ORDER BY expires_at
               LIMIT $2
               FOR UPDATE SKIP LOCKED"#,
        )
        .bind(ReservationStatus::Pending.code())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        rows.into_iter().map(reservation_from_row).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn product_from_row(row: DbProduct) -> Product {
    Product {
        id: row.id,
        name: row.name,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: None,
    }
}

fn sku_from_row(row: DbSku) -> Sku {
    Sku {
        id: row.id,
        product_id: row.product_id,
        code: row.code,
        price_cents: row.price_cents,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: None,
    }
}

fn inventory_from_row(row: DbInventory) -> Inventory {
    Inventory {
        sku_id: row.sku_id,
        quantity: row.quantity,
        reserved: row.reserved,
        version: row.version,
    }
}

fn reservation_from_row(row: DbReservation) -> StoreResult<Reservation> {
    let status = ReservationStatus::from_code(row.status)
        .ok_or_else(|| anyhow!("unknown reservation status code {}", row.status))?;
    let items = serde_json::from_value(row.items).map_err(|e| anyhow!(e))?;
    Ok(Reservation {
        id: row.id,
        status,
        items,
        expires_at: row.expires_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}
