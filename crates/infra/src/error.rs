//! Errors surfaced to ledger and catalog callers.

use thiserror::Error;

use stockroom_core::{DomainError, ProductId};

use crate::store::{StoreError, TransactionError};

/// Tagged failure of a ledger or catalog operation.
///
/// Store failures never leak their details: they are logged and reported as
/// [`LedgerError::Transient`], which the caller may retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for withdrawal: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        available: u64,
        requested: u64,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The store could not complete the request; nothing was written.
    #[error("{0}")]
    Transient(String),
}

impl LedgerError {
    pub fn transient() -> Self {
        Self::Transient("the stock service is temporarily unavailable, please try again".to_string())
    }

    /// Log a store failure and replace it with a generic transient error.
    pub(crate) fn from_store(operation: &'static str, err: StoreError) -> Self {
        tracing::warn!(operation, error = %err, "store operation failed");
        Self::transient()
    }

    pub(crate) fn from_domain(product_id: &ProductId, err: DomainError) -> Self {
        match err {
            DomainError::NotFound => Self::ProductNotFound(product_id.clone()),
            DomainError::InsufficientStock { available, requested } => Self::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested,
            },
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => Self::Validation(msg),
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }

    /// Domain rejection of a request that does not refer to a stored product yet.
    pub(crate) fn rejected(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => Self::Validation(msg),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Validation(other.to_string()),
        }
    }

    pub(crate) fn from_transaction(
        operation: &'static str,
        product_id: &ProductId,
        err: TransactionError,
    ) -> Self {
        match err {
            TransactionError::Rejected(domain) => Self::from_domain(product_id, domain),
            TransactionError::Store(store) => Self::from_store(operation, store),
        }
    }

    /// True when re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
