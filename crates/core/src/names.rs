//! Name rules for databases, tables, indexes and index fields
//!
//! Names end up inside column-family names (view tables are named
//! `ix_<db>__<table>__<index>`), so they are restricted to identifier
//! characters and may not contain the `__` separator.

use thiserror::Error;

/// Maximum length of a single name
pub const MAX_NAME_LENGTH: usize = 48;

/// Why a name was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// Empty name
    #[error("{kind} name must not be empty")]
    Empty {
        /// What was being named
        kind: &'static str,
    },

    /// Too long
    #[error("{kind} name '{name}' exceeds {MAX_NAME_LENGTH} characters")]
    TooLong {
        /// What was being named
        kind: &'static str,
        /// The rejected name
        name: String,
    },

    /// Bad characters or separator
    #[error("{kind} name '{name}' must start with a letter, contain only letters, digits and single underscores")]
    Malformed {
        /// What was being named
        kind: &'static str,
        /// The rejected name
        name: String,
    },
}

/// Validate a database, table or index name
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty { kind });
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            kind,
            name: name.to_string(),
        });
    }

    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let body_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !starts_with_letter || !body_ok || name.contains("__") {
        return Err(NameError::Malformed {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a dotted field path such as `address.city`
pub fn validate_field_path(path: &str) -> Result<(), NameError> {
    if path.is_empty() {
        return Err(NameError::Empty { kind: "field" });
    }
    path.split('.')
        .try_for_each(|segment| validate_name("field", segment))
}
