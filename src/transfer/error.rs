//! Transfer Error Types
//!
//! One error enum for the whole workflow. Ledger and reconciler errors are
//! propagated unchanged up through the coordinator to the caller.

use thiserror::Error;

use super::state::TransferStatus;
use crate::core_types::{InventoryItemId, Quantity, StoreId, TransferId};

/// Transfer error types
///
/// Every variant carries enough structure for the calling layer to build a
/// human message ("Not enough stock of X to approve this transfer").
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Caller errors (not retried) ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transfer {transfer_id} is {status}; cannot {operation}")]
    InvalidState {
        transfer_id: TransferId,
        status: TransferStatus,
        operation: &'static str,
    },

    #[error(
        "Insufficient stock of item {item_id} at store {store_id}: required {required}, available {available}"
    )]
    InsufficientStock {
        store_id: StoreId,
        item_id: InventoryItemId,
        required: Quantity,
        available: Quantity,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    // === Retryable once by the caller ===
    #[error("Transfer {0} was modified concurrently")]
    ConcurrencyConflict(TransferId),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TransferError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        TransferError::NotFound { entity, id }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::InvalidState { .. } => "INVALID_STATE",
            TransferError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            TransferError::NotFound { .. } => "NOT_FOUND",
            TransferError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::Validation(_) => 400,
            TransferError::NotFound { .. } => 404,
            TransferError::InvalidState { .. } | TransferError::ConcurrencyConflict(_) => 409,
            TransferError::InsufficientStock { .. } => 422,
            TransferError::DatabaseError(_) | TransferError::SystemError(_) => 500,
        }
    }

    /// Only a concurrency conflict may be retried, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::ConcurrencyConflict(_))
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::SystemError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::validation("empty items").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(TransferError::ConcurrencyConflict(1).code(), "CONCURRENCY_CONFLICT");
        assert_eq!(TransferError::not_found("Recipe", 9).code(), "NOT_FOUND");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::validation("x").http_status(), 400);
        assert_eq!(TransferError::not_found("Transfer", 1).http_status(), 404);
        assert_eq!(
            TransferError::InvalidState {
                transfer_id: 1,
                status: TransferStatus::Delivered,
                operation: "approve",
            }
            .http_status(),
            409
        );
        assert_eq!(
            TransferError::InsufficientStock {
                store_id: 1,
                item_id: 2,
                required: Decimal::from(10),
                available: Decimal::from(5),
            }
            .http_status(),
            422
        );
        assert_eq!(TransferError::SystemError("boom".into()).http_status(), 500);
    }

    #[test]
    fn test_display_carries_detail() {
        let err = TransferError::InsufficientStock {
            store_id: 1,
            item_id: 42,
            required: Decimal::from(10),
            available: Decimal::from(5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock of item 42 at store 1: required 10, available 5"
        );

        let err = TransferError::InvalidState {
            transfer_id: 7,
            status: TransferStatus::Rejected,
            operation: "deliver",
        };
        assert_eq!(err.to_string(), "Transfer 7 is REJECTED; cannot deliver");
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(TransferError::ConcurrencyConflict(3).is_retryable());
        assert!(!TransferError::validation("x").is_retryable());
        assert!(!TransferError::DatabaseError("x".into()).is_retryable());
    }
}
