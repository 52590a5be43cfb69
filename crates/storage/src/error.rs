//! Error types for the backing-store client
//!
//! Everything a [`Session`](crate::Session) can fail with is a
//! [`StoreError`]. The repository layer decides which of these map to domain
//! outcomes; the store itself never interprets them.

use docstore_core::DataType;
use thiserror::Error;

use crate::session::NodeId;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure to bind values into a prepared statement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// Wrong number of values
    #[error("expected {expected} bound values, got {actual}")]
    Arity {
        /// Number of bind markers in the statement
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },

    /// A value does not match the column type
    #[error("value for '{column}' must be {expected}, got {actual}")]
    Type {
        /// Column the marker is bound to
        column: String,
        /// Column type
        expected: DataType,
        /// Kind of the supplied value
        actual: &'static str,
    },
}

/// Errors returned by a backing store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Statement text could not be parsed
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Statement is well-formed but not valid for the current schema
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Values could not be bound
    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    /// Keyspace or table already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A node needed for the request is down
    #[error("node {node} unavailable")]
    Unavailable {
        /// The unreachable node
        node: NodeId,
    },

    /// Request did not complete in time
    #[error("request timed out after {millis}ms")]
    Timeout {
        /// Elapsed time
        millis: u64,
    },

    /// A row could not be decoded into the requested shape
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::Invalid`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::Invalid(msg.into())
    }

    /// Shorthand for [`StoreError::Decode`]
    pub fn decode(msg: impl Into<String>) -> Self {
        StoreError::Decode(msg.into())
    }

    /// True for bind failures (arity or type)
    pub fn is_bind(&self) -> bool {
        matches!(self, StoreError::Bind(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = StoreError::from(BindError::Type {
            column: "id".to_string(),
            expected: DataType::Uuid,
            actual: "text",
        });
        let msg = err.to_string();
        assert!(msg.contains("bind error"));
        assert!(msg.contains("uuid"));
        assert!(err.is_bind());
    }

    #[test]
    fn test_unavailable_display() {
        let err = StoreError::Unavailable { node: NodeId(2) };
        assert_eq!(err.to_string(), "node node-2 unavailable");
        assert!(!err.is_bind());
    }
}
