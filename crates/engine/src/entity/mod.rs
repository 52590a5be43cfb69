//! Stored entities and their column-family bindings
//!
//! Each submodule holds one entity kind, the [`EntityBinding`] that maps it
//! onto its column family, and the schema object that creates that column
//! family:
//!
//! | Entity | Column family | Identifier |
//! |--------|---------------|------------|
//! | [`Database`] | `databases` | `(name)` |
//! | [`Table`] | `tables` | `(database, name)` |
//! | [`Index`] | `indexes` | `(database, table, name)` |
//! | [`Document`] | `documents` | `(database, table, id, updated_at)` |
//!
//! [`EntityBinding`]: crate::repository::EntityBinding

pub mod database;
pub mod document;
pub mod index;
pub mod table;

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use docstore_core::validate_name;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use database::{Database, DatabaseBinding, DatabasesSchema};
pub use document::{Document, DocumentBinding, DocumentsSchema};
pub use index::{Index, IndexBinding, IndexField, IndexesSchema};
pub use table::{Table, TableBinding, TablesSchema};

/// Current time at the store's millisecond precision
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Back-reference from a document or index to its table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableReference {
    /// Owning database
    pub database: String,
    /// Table name
    pub name: String,
}

impl TableReference {
    /// Reference with validated names
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either name breaks the naming rules.
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let database = database.into();
        let name = name.into();
        validate_name("database", &database)?;
        validate_name("table", &name)?;
        Ok(Self { database, name })
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_table_reference_validates() {
        assert!(TableReference::new("shop", "orders").is_ok());
        assert!(TableReference::new("shop", "bad-name").is_err());
        assert!(TableReference::new("", "orders").is_err());
    }

    #[test]
    fn test_table_reference_display() {
        let table = TableReference::new("shop", "orders").unwrap();
        assert_eq!(table.to_string(), "shop.orders");
    }
}
