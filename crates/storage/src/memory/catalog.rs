//! Schema catalog for the memory cluster

use std::collections::BTreeMap;
use std::sync::Arc;

use docstore_core::DataType;

use crate::cql::{CreateTable, Order, TableName};
use crate::error::{StoreError, StoreResult};
use crate::statement::ColumnSpec;

/// Validated table definition
#[derive(Debug)]
pub struct TableSchema {
    /// Qualified name
    pub name: TableName,
    /// All columns in declaration order
    pub columns: Arc<[ColumnSpec]>,
    /// Column positions of the partition key
    pub partition_key: Vec<usize>,
    /// Column positions of the clustering key
    pub clustering_key: Vec<usize>,
    /// Direction per clustering column
    pub clustering_order: Vec<Order>,
}

impl TableSchema {
    /// Validate a `CREATE TABLE` definition
    pub fn from_definition(def: &CreateTable) -> StoreResult<Self> {
        let columns: Vec<ColumnSpec> = def
            .columns
            .iter()
            .map(|(name, data_type)| ColumnSpec::new(name.clone(), *data_type))
            .collect();

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StoreError::invalid(format!(
                    "duplicate column '{}' in {}",
                    column.name, def.table
                )));
            }
        }

        let position = |name: &String| {
            columns.iter().position(|c| &c.name == name).ok_or_else(|| {
                StoreError::invalid(format!(
                    "unknown key column '{}' in {}",
                    name, def.table
                ))
            })
        };
        let partition_key = def
            .partition_key
            .iter()
            .map(position)
            .collect::<StoreResult<Vec<_>>>()?;
        let clustering_key = def
            .clustering_key
            .iter()
            .map(position)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut clustering_order = vec![Order::Asc; clustering_key.len()];
        for (column, order) in &def.clustering_order {
            let slot = def
                .clustering_key
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| {
                    StoreError::invalid(format!(
                        "'{}' in CLUSTERING ORDER BY is not a clustering column",
                        column
                    ))
                })?;
            clustering_order[slot] = *order;
        }

        Ok(Self {
            name: def.table.clone(),
            columns: columns.into(),
            partition_key,
            clustering_key,
            clustering_order,
        })
    }

    /// Position of a column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of a column, or an invalid-request error
    pub fn require_column(&self, name: &str) -> StoreResult<usize> {
        self.column_index(name).ok_or_else(|| {
            StoreError::invalid(format!("undefined column '{}' in {}", name, self.name))
        })
    }

    /// Type of a column
    pub fn column_type(&self, name: &str) -> StoreResult<DataType> {
        self.require_column(name).map(|i| self.columns[i].data_type)
    }

    /// True for partition key and clustering columns
    pub fn is_key_column(&self, index: usize) -> bool {
        self.partition_key.contains(&index) || self.clustering_key.contains(&index)
    }
}

/// Keyspaces and their tables
#[derive(Debug, Default)]
pub struct Catalog {
    keyspaces: BTreeMap<String, BTreeMap<String, Arc<TableSchema>>>,
}

impl Catalog {
    /// True if the keyspace exists
    pub fn has_keyspace(&self, name: &str) -> bool {
        self.keyspaces.contains_key(name)
    }

    /// Add a keyspace; false if it already existed
    pub fn add_keyspace(&mut self, name: &str) -> bool {
        if self.keyspaces.contains_key(name) {
            return false;
        }
        self.keyspaces.insert(name.to_string(), BTreeMap::new());
        true
    }

    /// Remove a keyspace and return the names of its tables
    pub fn remove_keyspace(&mut self, name: &str) -> Option<Vec<TableName>> {
        self.keyspaces
            .remove(name)
            .map(|tables| tables.values().map(|t| t.name.clone()).collect())
    }

    /// Look up a table
    pub fn table(&self, name: &TableName) -> StoreResult<Arc<TableSchema>> {
        let tables = self.keyspaces.get(&name.keyspace).ok_or_else(|| {
            StoreError::invalid(format!("keyspace '{}' does not exist", name.keyspace))
        })?;
        tables
            .get(&name.table)
            .cloned()
            .ok_or_else(|| StoreError::invalid(format!("table {} does not exist", name)))
    }

    /// Add a table; false if it already existed
    pub fn add_table(&mut self, schema: TableSchema) -> StoreResult<bool> {
        let tables = self.keyspaces.get_mut(&schema.name.keyspace).ok_or_else(|| {
            StoreError::invalid(format!(
                "keyspace '{}' does not exist",
                schema.name.keyspace
            ))
        })?;
        if tables.contains_key(&schema.name.table) {
            return Ok(false);
        }
        tables.insert(schema.name.table.clone(), Arc::new(schema));
        Ok(true)
    }

    /// Remove a table; false if it did not exist
    pub fn remove_table(&mut self, name: &TableName) -> bool {
        self.keyspaces
            .get_mut(&name.keyspace)
            .and_then(|tables| tables.remove(&name.table))
            .is_some()
    }

    /// Keyspace names
    pub fn keyspace_names(&self) -> Vec<String> {
        self.keyspaces.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::{parse, Statement};

    fn definition(cql: &str) -> CreateTable {
        match parse(cql).unwrap() {
            Statement::CreateTable(ct) => ct,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_schema_positions() {
        let schema = TableSchema::from_definition(&definition(
            "CREATE TABLE ks.t (a text, b bigint, c text, v text, PRIMARY KEY ((a), b, c)) \
             WITH CLUSTERING ORDER BY (c DESC)",
        ))
        .unwrap();
        assert_eq!(schema.partition_key, vec![0]);
        assert_eq!(schema.clustering_key, vec![1, 2]);
        assert_eq!(schema.clustering_order, vec![Order::Asc, Order::Desc]);
        assert!(schema.is_key_column(2));
        assert!(!schema.is_key_column(3));
    }

    #[test]
    fn test_unknown_key_column() {
        let err = TableSchema::from_definition(&definition(
            "CREATE TABLE ks.t (a text, PRIMARY KEY (a, zz))",
        ))
        .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_order_on_non_clustering_column() {
        let err = TableSchema::from_definition(&definition(
            "CREATE TABLE ks.t (a text, b text, PRIMARY KEY (a, b)) WITH CLUSTERING ORDER BY (a DESC)",
        ))
        .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_table_requires_keyspace() {
        let mut catalog = Catalog::default();
        let schema = TableSchema::from_definition(&definition(
            "CREATE TABLE ks.t (a text PRIMARY KEY)",
        ))
        .unwrap();
        assert!(catalog.add_table(schema).is_err());
        assert!(catalog.add_keyspace("ks"));
        assert!(!catalog.add_keyspace("ks"));
    }
}
