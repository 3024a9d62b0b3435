//! Domain error types.

use thiserror::Error;

/// Errors raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend aborted the transaction to resolve lock contention. Safe to retry.
    #[error("Transaction aborted: {0}")]
    Contention(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

/// Errors raised while reading resource content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Content unavailable: {0}")]
    Io(String),
}

/// Transient failures on the live tunnel path. Logged, never fatal to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    #[error("Endpoint {0} has no live tunnel")]
    NotConnected(i64),

    #[error("Tunnel to endpoint {0} is saturated")]
    Saturated(i64),

    #[error("Tunnel to endpoint {0} closed")]
    Closed(i64),
}

/// Errors surfaced by the engine to its callers.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store failure; the current transaction is rolled back.
    #[error("Persistence error: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for EdgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => EdgeError::NotFound(err.to_string()),
            StoreError::Conflict(msg) => EdgeError::Conflict(msg),
            other => EdgeError::Persistence(other),
        }
    }
}

impl From<validator::ValidationErrors> for EdgeError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EdgeError::Validation(errors.to_string())
    }
}
