//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every ledger and purchase-order operation either fully applies or reports one
/// of these and leaves the record untouched. Storage failures belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// An id or key does not resolve.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The requested quantity exceeds the stock that can be drawn from.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: f64, available: f64 },

    /// A state-machine guard failed.
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// The operation is not permitted in the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An invariant or input check failed on a specific field.
    #[error("validation failed on `{field}`: {message}")]
    ValidationFailed { field: String, message: String },

    /// A stale version was written (optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn insufficient_stock(requested: f64, available: f64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_transition(
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Field name carried by a `ValidationFailed` error.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::ValidationFailed { field, .. } => Some(field),
            _ => None,
        }
    }
}
