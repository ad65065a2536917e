//! Error handling for the inventory allocation engine
//!
//! Validation and not-found errors are returned before any mutation.
//! Insufficient-stock errors abort the single reservation they occur in.
//! Batch flows (allocation execution, preorder conversion) catch per-item
//! errors into their summaries instead of propagating them.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Engine error taxonomy
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business errors
    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Ledger invariant `quantity == reserved + available` failed on read.
    /// Indicates a prior bug or an un-transacted write; the operation is
    /// aborted, never patched up.
    #[error("Ledger consistency violation: {0}")]
    Consistency(String),

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shortfall carried by an insufficient-stock error
    pub fn shortfall(&self) -> Option<i32> {
        match self {
            AppError::InsufficientStock {
                requested,
                available,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "input".to_string());
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type AppResult<T> = Result<T, AppError>;

/// Raise a consistency violation for a lot whose counters do not add up.
/// Logged at error severity where detected; the operation aborts rather
/// than patching the counters.
pub fn lot_consistency_violation(
    lot_id: Uuid,
    quantity: i32,
    reserved: i32,
    available: i32,
    cost_basis: Decimal,
) -> AppError {
    let detail = format!(
        "lot {lot_id}: quantity={quantity} != reserved={reserved} + available={available} (cost_basis={cost_basis})"
    );
    tracing::error!(%lot_id, quantity, reserved, available, "ledger invariant violated");
    AppError::Consistency(detail)
}
