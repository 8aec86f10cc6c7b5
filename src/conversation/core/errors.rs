//! Error types for the conversation subsystem.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Storage backend error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` storage error, raised on the connection thread.
    #[error("sqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Metadata (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored row could not be decoded back into a record.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    /// A record with the same identifier already exists.
    #[error("duplicate record id: {0}")]
    DuplicateId(String),
    /// The operation deadline passed; nothing was stored.
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Convenience result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One rejected request field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Name of the field as it appears in the request body.
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl FieldViolation {
    /// Build a violation for `field`.
    #[must_use]
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A request was rejected before touching storage.
///
/// Always carries at least one [`FieldViolation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Turn collected violations into a result: `Ok` when there are none.
    ///
    /// # Errors
    /// Returns `ValidationError` if `violations` is non-empty.
    pub fn check(violations: Vec<FieldViolation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }

    /// Build an error for a single failing field.
    #[must_use]
    pub fn single(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, reason)],
        }
    }

    /// All violations, in field order.
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Names of the failing fields.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.violations.iter().map(|violation| violation.field)
    }

    /// Whether `field` is among the failing fields.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields().any(|name| name == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid request")?;
        for (index, violation) in self.violations.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", violation.field, violation.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors surfaced by [`ConversationService`](crate::conversation::ConversationService).
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Malformed request field(s).
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The referenced conversation does not exist.
    #[error("no conversation found with id: {0}")]
    NotFound(String),
    /// Storage failure, including deadline expiry.
    #[error("internal error: {0}")]
    Internal(#[from] StoreError),
}

/// Convenience result alias for service operations.
pub type ConversationResult<T> = Result<T, ConversationError>;
