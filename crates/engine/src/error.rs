//! Error types for the document store
//!
//! Every repository operation ends in success or exactly one of the four
//! storage outcomes: [`Error::DuplicateItem`], [`Error::ItemNotFound`],
//! [`Error::InvalidIdentifier`] and [`Error::StorageFailure`].
//! [`Error::VersionConflict`] is raised by the document store when another
//! writer extended a document's history first. The remaining variants are
//! raised before anything reaches the store.

use docstore_core::NameError;
use docstore_storage::{BindError, StoreError};
use thiserror::Error;

/// Result type alias for document store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the document store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A conditional create found the row already present
    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    /// The addressed row does not exist
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Identifier components do not fit the key columns
    #[error("Invalid identifier {identifier}: {source}")]
    InvalidIdentifier {
        /// Rendered identifier
        identifier: String,
        /// Arity or type mismatch
        #[source]
        source: BindError,
    },

    /// The document was updated from a version that is no longer the latest
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// The backing store failed the request
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    /// The entity binding declares no statement for this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Rejected name, field descriptor or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file could not be read, parsed or written
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Shorthand for [`Error::Config`]
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for [`Error::ItemNotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ItemNotFound(_))
    }

    /// True for [`Error::DuplicateItem`]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateItem(_))
    }

    /// True for [`Error::VersionConflict`]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict(_))
    }

    /// True for [`Error::StorageFailure`]
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::StorageFailure(_))
    }
}

impl From<BindError> for Error {
    fn from(e: BindError) -> Self {
        Error::StorageFailure(StoreError::Bind(e))
    }
}

impl From<NameError> for Error {
    fn from(e: NameError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::validate_name;

    #[test]
    fn test_bind_error_is_storage_failure() {
        let err = Error::from(BindError::Arity {
            expected: 2,
            actual: 1,
        });
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_name_error_is_invalid_input() {
        let err: Error = validate_name("table", "bad__name").unwrap_err().into();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("bad__name"));
    }

    #[test]
    fn test_invalid_identifier_display() {
        let err = Error::InvalidIdentifier {
            identifier: "(a, 1)".to_string(),
            source: BindError::Arity {
                expected: 3,
                actual: 2,
            },
        };
        assert_eq!(
            err.to_string(),
            "Invalid identifier (a, 1): expected 3 bound values, got 2"
        );
    }
}
