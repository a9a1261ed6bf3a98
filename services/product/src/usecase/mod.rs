//! Use cases orchestrating domain, store, and idempotency concerns.
//!
//! Catalog reads go straight from handler to store; the reservation flows
//! live here because they compose idempotency locking, lock-ordered stock
//! mutation, and the transactional boundary.
mod inventory;

pub use inventory::{
    BatchReserveInput, PROCESSING_MARKER, ReservationUseCase, ReservationUseCaseConfig,
    ReserveItem,
};
