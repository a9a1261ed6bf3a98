//! Batch reservation, confirmation, and release.
//!
//! # Batch reserve
//! 1. Validate the batch (non-empty, within the configured bound).
//! 2. Under an idempotency key: `SetNX(key, "processing")`. Losing the race
//!    means either a concurrent duplicate (still `processing`) or a replay
//!    (value parses as a reservation id → return that reservation).
//! 3. Sort items by sku id ascending. Every writer touching overlapping
//!    SKUs acquires row locks in the same order, which is what rules out
//!    deadlock between concurrent reservers.
//! 4. Inside one transaction: a guarded reserve per item, then the
//!    reservation row insert. Any failure rolls everything back.
//! 5. On failure the key is deleted (best effort) so a corrected retry can
//!    proceed; on success it is overwritten with the reservation id.
//!
//! # Confirm / release
//! Idempotent via `confirm:`/`release:` marker keys. Confirm realizes the
//! hold as a sale (quantity and reserved both drop); release only returns
//! the hold. Both transition the row out of PENDING inside the same
//! transaction as the stock mutation.
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::{DomainError, Inventory, Reservation, ReservationItem};
use crate::idempotency::IdempotencyStore;
use crate::store::{ProductStore, StoreTx};

/// Marker stored while a reservation with this key is in flight.
pub const PROCESSING_MARKER: &str = "processing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveItem {
    pub sku_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct BatchReserveInput {
    pub items: Vec<ReserveItem>,
    pub idempotency_key: Option<String>,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ReservationUseCaseConfig {
    pub max_batch_size: usize,
    pub default_ttl: Duration,
    pub idempotency_ttl: Duration,
}

pub struct ReservationUseCase {
    store: Arc<dyn ProductStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    config: ReservationUseCaseConfig,
}

impl ReservationUseCase {
    pub fn new(
        store: Arc<dyn ProductStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        config: ReservationUseCaseConfig,
    ) -> Self {
        Self {
            store,
            idempotency,
            config,
        }
    }

    pub async fn get_inventory(&self, sku_id: Uuid) -> Result<Inventory, DomainError> {
        self.store.get_inventory(sku_id).await
    }

    pub async fn set_quantity(&self, sku_id: Uuid, quantity: i64) -> Result<(), DomainError> {
        if quantity < 0 {
            return Err(DomainError::InvalidQuantity);
        }
        self.store.set_quantity(sku_id, quantity).await
    }

    pub async fn get_reservation(&self, id: Uuid) -> Result<Reservation, DomainError> {
        self.store.get_reservation(id).await
    }

    pub async fn batch_reserve(
        &self,
        input: BatchReserveInput,
    ) -> Result<Reservation, DomainError> {
        if input.items.is_empty() {
            return Err(DomainError::InvalidQuantity);
        }
        if input.items.len() > self.config.max_batch_size {
            return Err(DomainError::BatchSizeExceeded);
        }

        let mut lock_acquired = false;
        if let Some(key) = input.idempotency_key.as_deref() {
            let locked = self
                .idempotency
                .set_nx(key, PROCESSING_MARKER, self.config.idempotency_ttl)
                .await?;
            if !locked {
                return self.resolve_existing_key(key).await;
            }
            lock_acquired = true;
        }

        let outcome = self.reserve_batch(input.items, input.ttl).await;

        match (&outcome, input.idempotency_key.as_deref()) {
            (Ok(reservation), Some(key)) if lock_acquired => {
                // Replace the processing marker with the result; replays of
                // this key now return the same reservation.
                let _ = self
                    .idempotency
                    .set(
                        key,
                        &reservation.id.to_string(),
                        self.config.idempotency_ttl,
                    )
                    .await;
            }
            (Err(_), Some(key)) if lock_acquired => {
                // Best effort: free the key so a corrected retry is not
                // stuck behind a stale processing marker until TTL.
                let _ = self.idempotency.del(key).await;
            }
            _ => {}
        }
        outcome
    }

    /// The key was already present: concurrent duplicate or true replay.
    async fn resolve_existing_key(&self, key: &str) -> Result<Reservation, DomainError> {
        match self.idempotency.get(key).await? {
            Some(value) if value == PROCESSING_MARKER => Err(DomainError::IdempotencyKeyExists),
            Some(value) => match Uuid::parse_str(&value) {
                Ok(id) => self.store.get_reservation(id).await,
                Err(_) => Err(DomainError::IdempotencyKeyExists),
            },
            // Expired between SetNX and Get; treat as an in-flight duplicate.
            None => Err(DomainError::IdempotencyKeyExists),
        }
    }

    async fn reserve_batch(
        &self,
        mut items: Vec<ReserveItem>,
        ttl: Option<Duration>,
    ) -> Result<Reservation, DomainError> {
        // Lock-ordering discipline: ascending sku id.
        items.sort_by_key(|item| item.sku_id);

        let reservation_items: Vec<ReservationItem> = items
            .iter()
            .map(|item| ReservationItem {
                sku_id: item.sku_id,
                quantity: item.quantity,
            })
            .collect();
        let reservation = Reservation::new(
            reservation_items,
            ttl.unwrap_or(self.config.default_ttl),
        )?;

        let mut tx = self.store.begin().await?;
        for item in &items {
            if let Err(err) = tx.reserve_stock(item.sku_id, item.quantity).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
        if let Err(err) = tx.insert_reservation(&reservation).await {
            let _ = tx.rollback().await;
            return Err(err);
        }
        tx.commit().await?;
        Ok(reservation)
    }

    pub async fn confirm_reservation(
        &self,
        reservation_id: Uuid,
        idempotency_key: Option<&str>,
    ) -> Result<(), DomainError> {
        let marker = idempotency_key.map(|key| format!("confirm:{key}"));
        if let Some(marker) = marker.as_deref() {
            if self.idempotency.get(marker).await?.is_some() {
                return Ok(());
            }
        }

        let mut reservation = self.store.get_reservation(reservation_id).await?;
        // Validates PENDING-and-not-expired before any stock is touched.
        reservation.confirm()?;

        let mut tx = self.store.begin().await?;
        for item in &reservation.items {
            if let Err(err) = tx.confirm_stock(item.sku_id, item.quantity).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
        if let Err(err) = tx
            .update_reservation_status(reservation_id, reservation.status)
            .await
        {
            let _ = tx.rollback().await;
            return Err(err);
        }
        tx.commit().await?;

        if let Some(marker) = marker.as_deref() {
            let _ = self
                .idempotency
                .set(marker, "done", self.config.idempotency_ttl)
                .await;
        }
        Ok(())
    }

    pub async fn release_reservation(
        &self,
        reservation_id: Uuid,
        idempotency_key: Option<&str>,
    ) -> Result<(), DomainError> {
        let marker = idempotency_key.map(|key| format!("release:{key}"));
        if let Some(marker) = marker.as_deref() {
            if self.idempotency.get(marker).await?.is_some() {
                return Ok(());
            }
        }

        let mut reservation = self.store.get_reservation(reservation_id).await?;
        // No expiry check: an expired-but-still-PENDING reservation stays
        // releasable, and the guarded decrement cannot double-release.
        reservation.release()?;

        let mut tx = self.store.begin().await?;
        for item in &reservation.items {
            if let Err(err) = tx.release_stock(item.sku_id, item.quantity).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
        if let Err(err) = tx
            .update_reservation_status(reservation_id, reservation.status)
            .await
        {
            let _ = tx.rollback().await;
            return Err(err);
        }
        tx.commit().await?;

        if let Some(marker) = marker.as_deref() {
            let _ = self
                .idempotency
                .set(marker, "done", self.config.idempotency_ttl)
                .await;
        }
        Ok(())
    }
}
