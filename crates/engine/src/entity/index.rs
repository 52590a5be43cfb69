//! Bucketed view index definitions
//!
//! An index belongs to one table and lists the document fields it projects,
//! in clustering order. Fields are declared as `"name:type"` descriptors:
//!
//! ```text
//! "customer:text"   "total:integer"   "address.city:text"
//! ```
//!
//! A descriptor without a type is `text`. Dotted names walk into nested
//! objects.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use docstore_core::{identifier, validate_field_path, validate_name, DataType, Identifier, Value};
use docstore_storage::{Row, Session, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;
use uuid::Uuid;

use super::{now_millis, TableReference};
use crate::error::{Error, Result};
use crate::repository::{EntityBinding, StatementTemplates};
use crate::schema::{execute_ddl, Schemaable};

/// Column family name
pub const INDEXES_TABLE: &str = "indexes";

// ============================================================================
// IndexField
// ============================================================================

/// One projected document field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexField {
    /// Field path, dotted for nested objects
    pub name: String,
    /// Column type of the projected value
    pub field_type: DataType,
}

impl IndexField {
    /// Parse a `"name:type"` descriptor
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed path, an unknown type or a
    /// type that cannot come from JSON (`blob`).
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (name, type_name) = match descriptor.split_once(':') {
            Some((name, type_name)) => (name.trim(), type_name.trim()),
            None => (descriptor.trim(), "text"),
        };
        validate_field_path(name)?;
        let field_type = DataType::from_str(type_name)
            .map_err(|e| Error::invalid_input(format!("index field '{}': {}", name, e)))?;
        if field_type == DataType::Blob {
            return Err(Error::invalid_input(format!(
                "index field '{}': blob values cannot be projected from JSON",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            field_type,
        })
    }

    /// View column holding this field
    ///
    /// Path dots become `__`, which names never contain, so distinct paths
    /// never share a column.
    pub fn column(&self) -> String {
        format!("f_{}", self.name.replace('.', "__")).to_ascii_lowercase()
    }

    /// Project this field out of a document body
    ///
    /// A missing field is `Null`. A value of the wrong JSON kind is also
    /// `Null` and is logged.
    pub fn extract(&self, body: &Map<String, JsonValue>) -> Value {
        let Some(raw) = lookup_path(body, &self.name) else {
            return Value::Null;
        };
        let value = match (self.field_type, raw) {
            (_, JsonValue::Null) => return Value::Null,
            (DataType::Text, JsonValue::String(s)) => Some(Value::Text(s.clone())),
            (DataType::BigInt, JsonValue::Number(n)) => n.as_i64().map(Value::BigInt),
            (DataType::Double, JsonValue::Number(n)) => n.as_f64().map(Value::Double),
            (DataType::Boolean, JsonValue::Bool(b)) => Some(Value::Boolean(*b)),
            (DataType::Uuid, JsonValue::String(s)) => Uuid::parse_str(s).ok().map(Value::Uuid),
            (DataType::Timestamp, JsonValue::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| Value::Timestamp(t.with_timezone(&Utc).trunc_subsecs(3))),
            (DataType::Timestamp, JsonValue::Number(n)) => {
                n.as_i64().map(Value::timestamp_millis)
            }
            _ => None,
        };
        value.unwrap_or_else(|| {
            warn!(
                field = %self.name,
                expected = %self.field_type,
                "Index field has the wrong JSON type, projecting null"
            );
            Value::Null
        })
    }
}

fn lookup_path<'a>(body: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.field_type)
    }
}

impl FromStr for IndexField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IndexField {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<IndexField> for String {
    fn from(field: IndexField) -> Self {
        field.to_string()
    }
}

// ============================================================================
// Index
// ============================================================================

/// A bucketed view index over one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Indexed table
    pub table: TableReference,
    /// Index name, unique within the table
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Projected fields in clustering order
    pub fields: Vec<IndexField>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Index {
    /// Define an index from field descriptors
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a bad name, no fields, a bad descriptor, or
    /// two fields that map to the same view column.
    pub fn new<I, S>(table: TableReference, name: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        validate_name("index", &name)?;
        let fields = fields
            .into_iter()
            .map(|d| IndexField::parse(d.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::check_fields(&name, &fields)?;
        Ok(Self {
            table,
            name,
            description: None,
            fields,
            created_at: now_millis(),
        })
    }

    fn check_fields(name: &str, fields: &[IndexField]) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::invalid_input(format!(
                "index '{}' must declare at least one field",
                name
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.column() == field.column()) {
                return Err(Error::invalid_input(format!(
                    "index '{}' declares field '{}' twice",
                    name, field.name
                )));
            }
        }
        Ok(())
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Store identifier `(database, table, name)`
    pub fn identifier(&self) -> Identifier {
        identifier![
            self.table.database.as_str(),
            self.table.name.as_str(),
            self.name.as_str()
        ]
    }

    /// Name of the view table, `ix_<db>__<table>__<index>`
    pub fn view_table(&self) -> String {
        format!(
            "ix_{}__{}__{}",
            self.table.database, self.table.name, self.name
        )
        .to_ascii_lowercase()
    }

    /// Project every field out of a document body, in declared order
    pub fn project(&self, body: &Map<String, JsonValue>) -> Vec<Value> {
        self.fields.iter().map(|f| f.extract(body)).collect()
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Binding of [`Index`] onto the `indexes` column family
///
/// Indexes are partitioned by table; `read_all` takes `(database, table)`.
/// Field lists are stored as a JSON array of descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexBinding;

impl EntityBinding for IndexBinding {
    type Entity = Index;

    fn kind(&self) -> &'static str {
        "index"
    }

    fn templates(&self, keyspace: &str) -> StatementTemplates {
        let t = format!("{}.{}", keyspace, INDEXES_TABLE);
        StatementTemplates {
            create: Some(format!(
                "INSERT INTO {} (db_name, tbl_name, name, description, fields, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                t
            )),
            update: Some(format!(
                "UPDATE {} SET description = ? \
                 WHERE db_name = ? AND tbl_name = ? AND name = ? IF EXISTS",
                t
            )),
            delete: Some(format!(
                "DELETE FROM {} WHERE db_name = ? AND tbl_name = ? AND name = ? IF EXISTS",
                t
            )),
            read: Some(format!(
                "SELECT * FROM {} WHERE db_name = ? AND tbl_name = ? AND name = ?",
                t
            )),
            read_all: Some(format!(
                "SELECT * FROM {} WHERE db_name = ? AND tbl_name = ?",
                t
            )),
            queries: Vec::new(),
        }
    }

    fn bind_create(&self, index: &Index) -> Vec<Value> {
        let descriptors: Vec<String> = index.fields.iter().map(IndexField::to_string).collect();
        vec![
            index.table.database.as_str().into(),
            index.table.name.as_str().into(),
            index.name.as_str().into(),
            index.description.clone().into(),
            JsonValue::from(descriptors).to_string().into(),
            index.created_at.into(),
        ]
    }

    fn bind_update(&self, index: &Index) -> Vec<Value> {
        vec![
            index.description.clone().into(),
            index.table.database.as_str().into(),
            index.table.name.as_str().into(),
            index.name.as_str().into(),
        ]
    }

    fn marshal_row(&self, row: &Row) -> StoreResult<Index> {
        let name = row.require_text("name")?.to_string();
        let fields: Vec<IndexField> = serde_json::from_str(row.require_text("fields")?)
            .map_err(|e| {
                StoreError::decode(format!("fields of index '{}': {}", name, e))
            })?;
        Ok(Index {
            table: TableReference {
                database: row.require_text("db_name")?.to_string(),
                name: row.require_text("tbl_name")?.to_string(),
            },
            name,
            description: row.get_text("description")?.map(str::to_string),
            fields,
            created_at: row.require_timestamp("created_at")?,
        })
    }

    fn identifier(&self, index: &Index) -> Identifier {
        index.identifier()
    }
}

/// Schema of the `indexes` column family
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexesSchema;

#[async_trait]
impl Schemaable for IndexesSchema {
    fn name(&self) -> String {
        INDEXES_TABLE.to_string()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.{} (\
                 db_name text, tbl_name text, name text, description text, \
                 fields text, created_at timestamp, \
                 PRIMARY KEY ((db_name, tbl_name), name))",
                keyspace, INDEXES_TABLE
            ),
        )
        .await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!("DROP TABLE IF EXISTS {}.{}", keyspace, INDEXES_TABLE),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> TableReference {
        TableReference::new("shop", "orders").unwrap()
    }

    fn body(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_descriptors() {
        let field = IndexField::parse("total:integer").unwrap();
        assert_eq!(field.field_type, DataType::BigInt);
        assert_eq!(field.to_string(), "total:bigint");

        let field = IndexField::parse(" customer ").unwrap();
        assert_eq!(field.field_type, DataType::Text);
        assert_eq!(field.name, "customer");
    }

    #[test]
    fn test_parse_rejects_bad_descriptors() {
        assert!(IndexField::parse("total:money").is_err());
        assert!(IndexField::parse("raw:blob").is_err());
        assert!(IndexField::parse("a..b:text").is_err());
        assert!(IndexField::parse(":text").is_err());
    }

    #[test]
    fn test_nested_column_name() {
        let field = IndexField::parse("address.City:text").unwrap();
        assert_eq!(field.column(), "f_address__city");
    }

    #[test]
    fn test_extract_by_type() {
        let doc = body(json!({
            "a": "X",
            "b": 7,
            "c": 2.5,
            "d": true,
            "nested": { "city": "Oslo" },
            "when": "2024-03-01T10:00:00.123456Z",
        }));
        let field = |d: &str| IndexField::parse(d).unwrap();

        assert_eq!(field("a:text").extract(&doc), Value::from("X"));
        assert_eq!(field("b:integer").extract(&doc), Value::BigInt(7));
        assert_eq!(field("b:double").extract(&doc), Value::Double(7.0));
        assert_eq!(field("c:double").extract(&doc), Value::Double(2.5));
        assert_eq!(field("d:boolean").extract(&doc), Value::Boolean(true));
        assert_eq!(field("nested.city:text").extract(&doc), Value::from("Oslo"));

        let when = field("when:timestamp").extract(&doc);
        assert_eq!(when.as_timestamp().unwrap().timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_extract_missing_or_mismatched_is_null() {
        let doc = body(json!({ "a": 1, "b": "seven", "n": null }));
        let field = |d: &str| IndexField::parse(d).unwrap();

        assert!(field("zzz:text").extract(&doc).is_null());
        assert!(field("a:text").extract(&doc).is_null());
        assert!(field("b:integer").extract(&doc).is_null());
        assert!(field("n:text").extract(&doc).is_null());
        assert!(field("a.deeper:text").extract(&doc).is_null());
    }

    #[test]
    fn test_index_projection_ignores_extra_fields() {
        let index = Index::new(orders(), "by_ab", ["a:text", "b:integer"]).unwrap();
        let projected = index.project(&body(json!({ "a": "X", "b": 7, "c": "ignored" })));
        assert_eq!(projected, vec![Value::from("X"), Value::BigInt(7)]);
    }

    #[test]
    fn test_index_validation() {
        assert!(Index::new(orders(), "empty", Vec::<&str>::new()).is_err());
        assert!(Index::new(orders(), "dup", ["a:text", "A:integer"]).is_err());
        assert!(Index::new(orders(), "bad__name", ["a"]).is_err());
    }

    #[test]
    fn test_view_table_name() {
        let index = Index::new(orders(), "ByCustomer", ["customer"]).unwrap();
        assert_eq!(index.view_table(), "ix_shop__orders__bycustomer");
        assert_eq!(index.identifier().to_string(), "(shop, orders, ByCustomer)");
    }

    #[test]
    fn test_fields_serialize_as_descriptors() {
        let index = Index::new(orders(), "by_ab", ["a:text", "b:int"]).unwrap();
        let json = serde_json::to_string(&index.fields).unwrap();
        assert_eq!(json, r#"["a:text","b:bigint"]"#);
        let back: Vec<IndexField> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index.fields);
    }
}
