//! Storage abstraction for the product service.
//!
//! # Transactional boundary
//! [`ProductStore::begin`] opens a [`StoreTx`]: every participant operation
//! issued through the handle observes one atomic boundary, `commit` makes
//! them all visible, and any other outcome (explicit `rollback` or dropping
//! the handle) discards them all. The multi-step flows (batch reserve,
//! confirm, release, expire) only mutate stock through a transaction.
//!
//! # Conditional writes
//! Stock mutations are single guarded statements (`quantity - reserved >=
//! amount`, `reserved >= amount`, `version = expected`). Zero rows affected
//! means either a concurrent writer or a failed guard; implementations
//! disambiguate by re-reading before reporting an error.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{DomainError, Inventory, Product, Reservation, ReservationStatus, Sku};

pub mod memory;
pub mod postgres;

pub type StoreResult<T> = Result<T, DomainError>;

/// One atomic unit of stock and reservation mutations.
#[async_trait]
pub trait StoreTx: Send {
    /// `reserved += amount` guarded by `quantity - reserved >= amount`.
    async fn reserve_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()>;

    /// `quantity -= amount, reserved -= amount` guarded by `reserved >= amount`.
    async fn confirm_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()>;

    /// `reserved -= amount` guarded by `reserved >= amount`. The guard is
    /// what makes a client-release/expirer race unable to double-decrement.
    async fn release_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;

    /// Transition a reservation out of PENDING. Guarded on the current
    /// status being PENDING; a terminal row yields `ReservationNotPending`.
    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    // Catalog.
    async fn create_product(&self, product: &Product) -> StoreResult<()>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Product>;
    async fn list_products(&self, limit: i64, offset: i64) -> StoreResult<Vec<Product>>;
    async fn create_sku(&self, sku: &Sku) -> StoreResult<()>;
    async fn get_sku(&self, id: Uuid) -> StoreResult<Sku>;

    // Inventory.
    async fn create_inventory(&self, inventory: &Inventory) -> StoreResult<()>;
    async fn get_inventory(&self, sku_id: Uuid) -> StoreResult<Inventory>;

    /// Optimistic single-row reservation outside a batch: guarded on both
    /// the stock condition and `version = expected_version`. Zero rows
    /// affected is disambiguated by re-reading.
    async fn reserve_with_version(
        &self,
        sku_id: Uuid,
        amount: i64,
        expected_version: i64,
    ) -> StoreResult<()>;

    /// Admin restock: `quantity = new_quantity` guarded by
    /// `new_quantity >= reserved`.
    async fn set_quantity(&self, sku_id: Uuid, quantity: i64) -> StoreResult<()>;

    // Reservations.
    async fn get_reservation(&self, id: Uuid) -> StoreResult<Reservation>;

    /// Up to `limit` PENDING reservations whose expiry has passed, selected
    /// with skip-locked semantics so concurrent expirers do not collide.
    async fn find_expired_pending(&self, limit: i64) -> StoreResult<Vec<Reservation>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
