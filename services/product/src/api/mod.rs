//! RPC surface of the product service.
//!
//! Handlers translate JSON request bodies into domain calls and map
//! [`DomainError`] onto the Connect code table. Unmapped storage errors are
//! logged in full and surfaced as a sanitized INTERNAL.
pub mod inventory;
pub mod product;

use mercata_rpc::{RpcCode, RpcError};

use crate::domain::DomainError;

pub(crate) fn to_rpc_error(err: DomainError) -> RpcError {
    let code = match &err {
        DomainError::ProductNotFound
        | DomainError::SkuNotFound
        | DomainError::InventoryNotFound
        | DomainError::ReservationNotFound => RpcCode::NotFound,

        DomainError::EmptyProductName
        | DomainError::ProductNameTooLong
        | DomainError::EmptySkuCode
        | DomainError::InvalidPrice
        | DomainError::InvalidQuantity
        | DomainError::InvalidReserved
        | DomainError::BatchSizeExceeded => RpcCode::InvalidArgument,

        DomainError::SkuCodeExists | DomainError::IdempotencyKeyExists => RpcCode::AlreadyExists,

        DomainError::InsufficientStock => RpcCode::ResourceExhausted,

        DomainError::OptimisticLockConflict | DomainError::ReservationExpired => RpcCode::Aborted,

        DomainError::ReservationNotPending => RpcCode::FailedPrecondition,

        DomainError::Storage(cause) => {
            tracing::error!(error = %cause, "storage error");
            return RpcError::internal();
        }
    };
    RpcError::new(code, err.to_string())
}
