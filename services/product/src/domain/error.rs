use thiserror::Error;

/// Closed set of domain failures. The RPC layer maps each variant onto a
/// wire code; anything that arrives as `Storage` is logged and sanitized.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("product not found")]
    ProductNotFound,
    #[error("sku not found")]
    SkuNotFound,
    #[error("inventory not found")]
    InventoryNotFound,
    #[error("reservation not found")]
    ReservationNotFound,

    #[error("product name cannot be empty")]
    EmptyProductName,
    #[error("product name must be 255 characters or less")]
    ProductNameTooLong,
    #[error("sku code cannot be empty")]
    EmptySkuCode,
    #[error("price must be non-negative")]
    InvalidPrice,
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("reserved count cannot go negative")]
    InvalidReserved,
    #[error("batch size exceeds maximum limit")]
    BatchSizeExceeded,

    #[error("sku code already exists")]
    SkuCodeExists,
    #[error("concurrent modification detected")]
    OptimisticLockConflict,
    #[error("idempotency key already processed")]
    IdempotencyKeyExists,

    #[error("insufficient stock available")]
    InsufficientStock,
    #[error("reservation has expired")]
    ReservationExpired,
    #[error("reservation is not in pending status")]
    ReservationNotPending,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
