//! Value types for docstore
//!
//! This module defines:
//! - Value: a single cell / bound-parameter value
//! - DataType: the column types a value can be stored as
//!
//! ## Ordering
//!
//! Two orderings exist and they serve different callers:
//!
//! - [`Value::natural_cmp`] is partial. Values of the same kind compare by
//!   their natural order; different kinds (and NaN) are not comparable.
//!   Identifiers fall back to string order when this returns `None`.
//! - [`Value::total_cmp`] is total. Kinds are ranked first (`Null` lowest),
//!   then compared naturally. Storage uses it for clustering order.

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A single column value
///
/// ## Type Equality
///
/// Different kinds are never equal, even when their renderings match:
/// `BigInt(1) != Text("1")`. Doubles follow IEEE-754 (`NaN != NaN`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit signed integer
    BigInt(i64),
    /// 64-bit float
    Double(f64),
    /// UTF-8 text
    Text(String),
    /// UUID
    Uuid(Uuid),
    /// Millisecond-precision instant; conversions truncate finer precision
    Timestamp(DateTime<Utc>),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::BigInt(_) => "bigint",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
        }
    }

    /// The column type this value belongs to, `None` for `Null`
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::BigInt(_) => Some(DataType::BigInt),
            Value::Double(_) => Some(DataType::Double),
            Value::Text(_) => Some(DataType::Text),
            Value::Uuid(_) => Some(DataType::Uuid),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Blob(_) => Some(DataType::Blob),
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is a BigInt value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as f64 if this is a Double value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as &str if this is a Text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as Uuid if this is a Uuid value
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Get as timestamp if this is a Timestamp value
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Get as bytes if this is a Blob value
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Natural order between two values of the same kind
    ///
    /// Returns `None` when the kinds differ or a double is NaN.
    pub fn natural_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for clustering keys
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            _ => match self.natural_cmp(other) {
                Some(ord) => ord,
                None => self.rank().cmp(&other.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::BigInt(_) => 2,
            Value::Double(_) => 3,
            Value::Text(_) => 4,
            Value::Uuid(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Blob(_) => 7,
        }
    }

    /// Whether this value may be bound to a column of `data_type`
    ///
    /// `Null` binds to every type.
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(own) => own == data_type,
        }
    }

    /// Build a timestamp value truncated to millisecond precision
    pub fn timestamp_millis(millis: i64) -> Value {
        match Utc.timestamp_millis_opt(millis).single() {
            Some(t) => Value::Timestamp(t),
            None => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Blob(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::BigInt(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::BigInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    /// Truncates to whole milliseconds
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t.trunc_subsecs(3))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// DataType
// ============================================================================

/// Column types understood by the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// `boolean`
    Boolean,
    /// `bigint`
    BigInt,
    /// `double`
    Double,
    /// `text`
    Text,
    /// `uuid`
    Uuid,
    /// `timestamp`
    Timestamp,
    /// `blob`
    Blob,
}

/// Unknown type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown data type: {0}")]
pub struct UnknownDataType(pub String);

impl DataType {
    /// CQL spelling of this type
    pub fn cql_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::BigInt => "bigint",
            DataType::Double => "double",
            DataType::Text => "text",
            DataType::Uuid => "uuid",
            DataType::Timestamp => "timestamp",
            DataType::Blob => "blob",
        }
    }
}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "bigint" | "int" | "integer" | "long" | "counter" => Ok(DataType::BigInt),
            "double" | "float" | "decimal" => Ok(DataType::Double),
            "text" | "varchar" | "ascii" | "string" => Ok(DataType::Text),
            "uuid" | "timeuuid" => Ok(DataType::Uuid),
            "timestamp" | "date" => Ok(DataType::Timestamp),
            "blob" => Ok(DataType::Blob),
            other => Err(UnknownDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}
