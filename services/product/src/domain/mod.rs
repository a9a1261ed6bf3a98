//! Domain model for the product service.
//!
//! Entities enforce their own invariants; persistence and transport live
//! elsewhere. The inventory rule that everything else leans on:
//! `quantity >= reserved >= 0` at all times, with `available` defined as
//! `quantity - reserved`.
mod error;
mod inventory;
mod product;
mod reservation;

pub use error::DomainError;
pub use inventory::Inventory;
pub use product::{Product, Sku};
pub use reservation::{Reservation, ReservationItem, ReservationStatus};
