//! In-memory store for tests and local development.
//!
//! Transactions are staged copies: `begin` takes the store lock and clones
//! the state, operations mutate the clone, and `commit` swaps it back in.
//! Holding the lock for the duration of a transaction serializes writers,
//! which is the in-memory analogue of the row locks the Postgres backend
//! relies on. State resets on process restart.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{DomainError, Inventory, Product, Reservation, ReservationStatus, Sku};

use super::{ProductStore, StoreResult, StoreTx};

#[derive(Debug, Default, Clone)]
struct MemState {
    products: HashMap<Uuid, Product>,
    skus: HashMap<Uuid, Sku>,
    inventory: HashMap<Uuid, Inventory>,
    reservations: HashMap<Uuid, Reservation>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    staged: MemState,
}

impl MemoryTx {
    fn inventory_mut(&mut self, sku_id: Uuid) -> StoreResult<&mut Inventory> {
        self.staged
            .inventory
            .get_mut(&sku_id)
            .ok_or(DomainError::InventoryNotFound)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn reserve_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        self.inventory_mut(sku_id)?.reserve(amount)
    }

    async fn confirm_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        self.inventory_mut(sku_id)?.confirm(amount)
    }

    async fn release_stock(&mut self, sku_id: Uuid, amount: i64) -> StoreResult<()> {
        self.inventory_mut(sku_id)?.release(amount)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()> {
        let reservation = self
            .staged
            .reservations
            .get_mut(&id)
            .ok_or(DomainError::ReservationNotFound)?;
        if !reservation.is_pending() {
            return Err(DomainError::ReservationNotPending);
        }
        reservation.status = status;
        reservation.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let mut guard = this.guard;
        *guard = this.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        // Dropping the staged copy discards every pending mutation.
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let state = self.state.lock().await;
        state
            .products
            .get(&id)
            .filter(|product| product.deleted_at.is_none())
            .cloned()
            .ok_or(DomainError::ProductNotFound)
    }

    async fn list_products(&self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|product| product.deleted_at.is_none())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(products
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn create_sku(&self, sku: &Sku) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .skus
            .values()
            .any(|existing| existing.code == sku.code && existing.deleted_at.is_none())
        {
            return Err(DomainError::SkuCodeExists);
        }
        state.skus.insert(sku.id, sku.clone());
        Ok(())
    }

    async fn get_sku(&self, id: Uuid) -> StoreResult<Sku> {
        let state = self.state.lock().await;
        state
            .skus
            .get(&id)
            .filter(|sku| sku.deleted_at.is_none())
            .cloned()
            .ok_or(DomainError::SkuNotFound)
    }

    async fn create_inventory(&self, inventory: &Inventory) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.inventory.insert(inventory.sku_id, inventory.clone());
        Ok(())
    }

    async fn get_inventory(&self, sku_id: Uuid) -> StoreResult<Inventory> {
        let state = self.state.lock().await;
        state
            .inventory
            .get(&sku_id)
            .cloned()
            .ok_or(DomainError::InventoryNotFound)
    }

    async fn reserve_with_version(
        &self,
        sku_id: Uuid,
        amount: i64,
        expected_version: i64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let inventory = state
            .inventory
            .get_mut(&sku_id)
            .ok_or(DomainError::InventoryNotFound)?;
        if inventory.version != expected_version {
            return Err(DomainError::OptimisticLockConflict);
        }
        inventory.reserve(amount)
    }

    async fn set_quantity(&self, sku_id: Uuid, quantity: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let inventory = state
            .inventory
            .get_mut(&sku_id)
            .ok_or(DomainError::InventoryNotFound)?;
        inventory.set_quantity(quantity)
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Reservation> {
        let state = self.state.lock().await;
        state
            .reservations
            .get(&id)
            .cloned()
            .ok_or(DomainError::ReservationNotFound)
    }

    async fn find_expired_pending(&self, limit: i64) -> StoreResult<Vec<Reservation>> {
        let now = chrono::Utc::now();
        let state = self.state.lock().await;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|res| res.is_pending() && res.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
