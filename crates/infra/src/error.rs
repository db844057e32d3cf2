//! Error model of the infrastructure layer.
//!
//! - [`StoreError`]: a persistence collaborator failed or timed out.
//! - [`DetectionError`]: a detection pass could not produce a result. Always
//!   recovered by the orchestrator into a partial failure.
//! - [`PipelineError`]: what a caller of the mutation pipeline sees.

use thiserror::Error;

use stockwatch_core::{DomainError, ProductId};
use stockwatch_inventory::{StockChange, StockError, Transaction};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store rejected or could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic concurrency failure or duplicate key.
    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("store call `{operation}` timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Transport failure, non-success status or timeout.
    #[error("detection unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a payload we cannot decode.
    #[error("malformed detection response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger committed a quantity but its transaction was not recorded.
    #[error("persistence inconsistency for product {}: quantity {} -> {} committed without a transaction ({reason})", .change.product_id, .change.previous, .change.new)]
    PersistenceInconsistency { change: StockChange, reason: String },

    /// Mutation and transaction committed, but detection results could not be merged.
    #[error("anomaly registry unavailable after transaction {} was recorded: {reason}", .transaction.id_typed())]
    RegistryUnavailable {
        transaction: Box<Transaction>,
        reason: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Rejected before anything was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::InsufficientStock { .. } | PipelineError::NotFound(_)
        )
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => PipelineError::Conflict(msg),
            StoreError::NotFound => PipelineError::NotFound("record".to_string()),
            other => PipelineError::Store(other),
        }
    }
}

impl From<DomainError> for PipelineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => PipelineError::Validation(msg),
            DomainError::InvariantViolation(msg) => PipelineError::Validation(msg),
            DomainError::Conflict(msg) => PipelineError::Conflict(msg),
            DomainError::NotFound => PipelineError::NotFound("record".to_string()),
        }
    }
}

impl From<StockError> for PipelineError {
    fn from(value: StockError) -> Self {
        match value {
            StockError::InsufficientStock {
                product_id,
                available,
                requested,
            } => PipelineError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StockError::InvalidMovement(msg) => PipelineError::Validation(msg),
            StockError::Overflow => PipelineError::Validation("stock quantity overflow".to_string()),
            e @ StockError::Diverged { .. } => PipelineError::Conflict(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_pipeline_conflicts() {
        let e: PipelineError = StoreError::Conflict("stale".to_string()).into();
        assert!(matches!(e, PipelineError::Conflict(_)));

        let e: PipelineError = StoreError::Timeout {
            operation: "products.get",
            after_ms: 5,
        }
        .into();
        assert!(matches!(e, PipelineError::Store(StoreError::Timeout { .. })));
        assert!(!e.is_rejection());
    }

    #[test]
    fn insufficient_stock_is_a_rejection() {
        let product_id = ProductId::new();
        let e: PipelineError = StockError::InsufficientStock {
            product_id,
            available: 5,
            requested: 10,
        }
        .into();
        assert!(e.is_rejection());
        assert!(e.to_string().contains("available 5"));
    }
}
