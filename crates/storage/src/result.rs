//! Result sets and rows

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docstore_core::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::statement::ColumnSpec;

/// One result row
///
/// Columns are shared between all rows of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[ColumnSpec]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row; `values` must line up with `columns`
    pub fn new(columns: Arc<[ColumnSpec]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Result columns
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of a named column
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the column is not part of the row.
    pub fn get(&self, name: &str) -> StoreResult<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| &self.values[i])
            .ok_or_else(|| StoreError::decode(format!("no column '{}' in row", name)))
    }

    /// Text column; `None` when null
    pub fn get_text(&self, name: &str) -> StoreResult<Option<&str>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(mismatch(name, "text", other)),
        }
    }

    /// Uuid column; `None` when null
    pub fn get_uuid(&self, name: &str) -> StoreResult<Option<Uuid>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::Uuid(u) => Ok(Some(*u)),
            other => Err(mismatch(name, "uuid", other)),
        }
    }

    /// Timestamp column; `None` when null
    pub fn get_timestamp(&self, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::Timestamp(t) => Ok(Some(*t)),
            other => Err(mismatch(name, "timestamp", other)),
        }
    }

    /// Text column that must be present
    pub fn require_text(&self, name: &str) -> StoreResult<&str> {
        self.get_text(name)?
            .ok_or_else(|| StoreError::decode(format!("column '{}' is null", name)))
    }

    /// Uuid column that must be present
    pub fn require_uuid(&self, name: &str) -> StoreResult<Uuid> {
        self.get_uuid(name)?
            .ok_or_else(|| StoreError::decode(format!("column '{}' is null", name)))
    }

    /// Timestamp column that must be present
    pub fn require_timestamp(&self, name: &str) -> StoreResult<DateTime<Utc>> {
        self.get_timestamp(name)?
            .ok_or_else(|| StoreError::decode(format!("column '{}' is null", name)))
    }
}

fn mismatch(name: &str, expected: &str, actual: &Value) -> StoreError {
    StoreError::decode(format!(
        "column '{}' is {}, expected {}",
        name,
        actual.type_name(),
        expected
    ))
}

/// Outcome of executing a statement
///
/// Conditional writes (`IF EXISTS` / `IF NOT EXISTS`) report whether they
/// were applied; every other statement is always applied.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    applied: Option<bool>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Result of a statement that returns nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a query
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            applied: None,
            rows,
        }
    }

    /// Result of a conditional write
    pub fn conditional(applied: bool) -> Self {
        Self {
            applied: Some(applied),
            rows: Vec::new(),
        }
    }

    /// False only when a conditional write's condition failed
    pub fn was_applied(&self) -> bool {
        self.applied.unwrap_or(true)
    }

    /// True when there are no rows
    pub fn is_exhausted(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in store order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// First row, if any
    pub fn one(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::DataType;

    fn row() -> Row {
        let columns: Arc<[ColumnSpec]> = vec![
            ColumnSpec::new("name", DataType::Text),
            ColumnSpec::new("id", DataType::Uuid),
        ]
        .into();
        Row::new(columns, vec![Value::from("a"), Value::Null])
    }

    #[test]
    fn test_typed_getters() {
        let row = row();
        assert_eq!(row.get_text("name").unwrap(), Some("a"));
        assert_eq!(row.get_uuid("id").unwrap(), None);
        assert!(row.require_uuid("id").is_err());
        assert!(row.get_uuid("name").is_err());
        assert!(row.get("missing").is_err());
    }

    #[test]
    fn test_applied_flag() {
        assert!(ResultSet::empty().was_applied());
        assert!(ResultSet::conditional(true).was_applied());
        assert!(!ResultSet::conditional(false).was_applied());
        assert!(ResultSet::with_rows(vec![row()]).was_applied());
    }
}
