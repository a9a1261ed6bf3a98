//! Background reservation expirer.
//!
//! Every tick: fetch a batch of PENDING reservations whose expiry has
//! passed (skip-locked, so concurrent workers partition the set), and for
//! each one, in its own transaction, release the reserved stock and mark
//! the row EXPIRED. One reservation failing does not abort the batch; the
//! next cycle retries whatever is still pending.
//!
//! Shutdown: flipping the watch channel makes the loop return before its
//! next tick; an in-flight reservation commits or rolls back atomically.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::{Reservation, ReservationStatus};
use crate::store::{ProductStore, StoreTx};

pub struct ReservationExpirer {
    store: Arc<dyn ProductStore>,
    interval: Duration,
    batch_size: i64,
}

impl ReservationExpirer {
    pub fn new(store: Arc<dyn ProductStore>, interval: Duration, batch_size: i64) -> Self {
        Self {
            store,
            interval,
            batch_size,
        }
    }

    /// Run until the shutdown channel flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "reservation expirer starting");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("reservation expirer shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.process_expired().await;
                }
            }
        }
    }

    async fn process_expired(&self) {
        let reservations = match self.store.find_expired_pending(self.batch_size).await {
            Ok(reservations) => reservations,
            Err(err) => {
                tracing::error!(error = %err, "failed to find expired reservations");
                return;
            }
        };
        if reservations.is_empty() {
            return;
        }

        for reservation in reservations {
            let id = reservation.id;
            match self.expire_one(reservation).await {
                Ok(()) => {
                    metrics::counter!("product_reservations_expired_total").increment(1);
                    tracing::info!(reservation_id = %id, "expired reservation");
                }
                Err(err) => {
                    // Leave it for the next cycle.
                    tracing::error!(reservation_id = %id, error = %err, "failed to expire reservation");
                }
            }
        }
    }

    /// Release every item's hold and mark the row EXPIRED, atomically.
    async fn expire_one(
        &self,
        reservation: Reservation,
    ) -> Result<(), crate::domain::DomainError> {
        let mut tx = self.store.begin().await?;
        for item in &reservation.items {
            if let Err(err) = tx.release_stock(item.sku_id, item.quantity).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
        if let Err(err) = tx
            .update_reservation_status(reservation.id, ReservationStatus::Expired)
            .await
        {
            let _ = tx.rollback().await;
            return Err(err);
        }
        tx.commit().await
    }
}
