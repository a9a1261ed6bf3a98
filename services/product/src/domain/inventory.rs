use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Per-SKU stock row. `quantity` is ground-truth stock after sales;
/// `reserved` is the soft hold carved out of it. The `version` counter backs
/// optimistic locking: conditional writes match on it and increment it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub sku_id: Uuid,
    pub quantity: i64,
    pub reserved: i64,
    pub version: i64,
}

impl Inventory {
    pub fn new(sku_id: Uuid, quantity: i64) -> Result<Self, DomainError> {
        if quantity < 0 {
            return Err(DomainError::InvalidQuantity);
        }
        Ok(Self {
            sku_id,
            quantity,
            reserved: 0,
            version: 1,
        })
    }

    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    pub fn can_reserve(&self, amount: i64) -> bool {
        self.available() >= amount
    }

    /// Carve `amount` out of the available stock.
    pub fn reserve(&mut self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if !self.can_reserve(amount) {
            return Err(DomainError::InsufficientStock);
        }
        self.reserved += amount;
        self.version += 1;
        Ok(())
    }

    /// Realize a hold as a sale: both quantity and reserved shrink.
    pub fn confirm(&mut self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if self.reserved < amount {
            return Err(DomainError::InvalidReserved);
        }
        self.quantity -= amount;
        self.reserved -= amount;
        self.version += 1;
        Ok(())
    }

    /// Cancel a hold: reserved shrinks, quantity is untouched.
    pub fn release(&mut self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if self.reserved < amount {
            return Err(DomainError::InvalidReserved);
        }
        self.reserved -= amount;
        self.version += 1;
        Ok(())
    }

    /// Admin restock/adjustment. Never below the outstanding holds.
    pub fn set_quantity(&mut self, quantity: i64) -> Result<(), DomainError> {
        if quantity < 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if quantity < self.reserved {
            return Err(DomainError::InsufficientStock);
        }
        self.quantity = quantity;
        self.version += 1;
        Ok(())
    }
}
