//! Prepared and bound statements
//!
//! A [`PreparedStatement`] is produced once by [`Session::prepare`] and then
//! bound many times. It carries the bind-variable metadata (column name and
//! type per `?` marker) and the positions of the markers that make up the
//! partition key, so a bound statement knows its own routing key.
//!
//! [`Session::prepare`]: crate::Session::prepare

use std::fmt;
use std::sync::Arc;

use docstore_core::{DataType, Value};

use crate::error::BindError;

/// Name and type of one bind variable or result column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Column type
    pub data_type: DataType,
}

impl ColumnSpec {
    /// Create a column spec
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug)]
struct PreparedInner {
    id: u64,
    query: String,
    variables: Vec<ColumnSpec>,
    routing_key_indexes: Option<Vec<usize>>,
}

/// Statement parsed and validated once by the store
///
/// Cheap to clone; clones share the same metadata.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    inner: Arc<PreparedInner>,
}

impl PreparedStatement {
    /// Create prepared statement metadata
    ///
    /// `routing_key_indexes` lists the marker positions of the partition key
    /// columns, in partition key order, when every one of them is bound by a
    /// marker.
    pub fn new(
        id: u64,
        query: impl Into<String>,
        variables: Vec<ColumnSpec>,
        routing_key_indexes: Option<Vec<usize>>,
    ) -> Self {
        Self {
            inner: Arc::new(PreparedInner {
                id,
                query: query.into(),
                variables,
                routing_key_indexes,
            }),
        }
    }

    /// Store-assigned statement id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Original statement text
    pub fn query(&self) -> &str {
        &self.inner.query
    }

    /// Bind variables in marker order
    pub fn variables(&self) -> &[ColumnSpec] {
        &self.inner.variables
    }

    /// Marker positions forming the partition key, if fully bound
    pub fn routing_key_indexes(&self) -> Option<&[usize]> {
        self.inner.routing_key_indexes.as_deref()
    }

    /// Bind positional values
    ///
    /// # Errors
    ///
    /// Fails when the number of values differs from the number of markers,
    /// or when a non-null value does not match its column type.
    pub fn bind(&self, values: Vec<Value>) -> Result<BoundStatement, BindError> {
        let variables = self.variables();
        if values.len() != variables.len() {
            return Err(BindError::Arity {
                expected: variables.len(),
                actual: values.len(),
            });
        }

        for (spec, value) in variables.iter().zip(values.iter()) {
            if !value.is_compatible_with(spec.data_type) {
                return Err(BindError::Type {
                    column: spec.name.clone(),
                    expected: spec.data_type,
                    actual: value.type_name(),
                });
            }
        }

        Ok(BoundStatement {
            prepared: self.clone(),
            values,
        })
    }
}

impl fmt::Display for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query())
    }
}

/// A prepared statement plus its positional values
#[derive(Debug, Clone)]
pub struct BoundStatement {
    prepared: PreparedStatement,
    values: Vec<Value>,
}

impl BoundStatement {
    /// The statement these values are bound to
    pub fn prepared(&self) -> &PreparedStatement {
        &self.prepared
    }

    /// Bound values in marker order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Partition key values, when the statement binds the whole partition key
    pub fn routing_key(&self) -> Option<Vec<&Value>> {
        self.prepared
            .routing_key_indexes()
            .map(|indexes| indexes.iter().map(|i| &self.values[*i]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared() -> PreparedStatement {
        PreparedStatement::new(
            1,
            "SELECT * FROM ks.t WHERE a = ? AND b = ?",
            vec![
                ColumnSpec::new("a", DataType::Text),
                ColumnSpec::new("b", DataType::BigInt),
            ],
            Some(vec![0]),
        )
    }

    #[test]
    fn test_bind_ok() {
        let bound = prepared()
            .bind(vec![Value::from("x"), Value::BigInt(3)])
            .unwrap();
        assert_eq!(bound.values().len(), 2);
        assert_eq!(bound.routing_key(), Some(vec![&Value::from("x")]));
    }

    #[test]
    fn test_bind_arity() {
        let err = prepared().bind(vec![Value::from("x")]).unwrap_err();
        assert_eq!(
            err,
            BindError::Arity {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_bind_type_mismatch() {
        let err = prepared()
            .bind(vec![Value::from("x"), Value::from("seven")])
            .unwrap_err();
        assert!(matches!(err, BindError::Type { ref column, .. } if column == "b"));
    }

    #[test]
    fn test_bind_null_is_compatible() {
        assert!(prepared().bind(vec![Value::from("x"), Value::Null]).is_ok());
    }
}
