//! Statement factory for bucketed views
//!
//! Built for one table and its indexes. For each index it prepares an
//! insert, a delete, and one lookup per key-prefix length against the
//! index's view table, then turns document writes into bound view
//! statements.

use chrono::{DateTime, Utc};
use docstore_core::{Identifier, Value};
use docstore_storage::{BoundStatement, PreparedStatement, Row, Session, StoreResult};
use tracing::debug;
use uuid::Uuid;

use super::PARTITION_COLUMNS;
use crate::entity::{Document, Index, TableReference};
use crate::error::{Error, Result};

/// One row of a view table
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    /// Projected field values in declared order
    pub key: Vec<Value>,
    /// Referenced document id
    pub id: Uuid,
    /// Referenced document version
    pub updated_at: DateTime<Utc>,
}

impl ViewEntry {
    /// Decode a view row of `index`
    pub fn from_row(index: &Index, row: &Row) -> StoreResult<Self> {
        let key = index
            .fields
            .iter()
            .map(|f| row.get(&f.column()).cloned())
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self {
            key,
            id: row.require_uuid("id")?,
            updated_at: row.require_timestamp("updated_at")?,
        })
    }

    /// Identifier of the referenced base document version
    pub fn document_identifier(&self, table: &TableReference) -> Identifier {
        docstore_core::identifier![
            table.database.as_str(),
            table.name.as_str(),
            self.id,
            self.updated_at
        ]
    }
}

#[derive(Debug)]
struct PreparedView {
    index: Index,
    insert: PreparedStatement,
    delete: PreparedStatement,
    /// `lookups[k]` restricts the first `k` fields
    lookups: Vec<PreparedStatement>,
}

impl PreparedView {
    fn prepare(session: &dyn Session, keyspace: &str, index: Index) -> Result<Self> {
        let view = format!("{}.{}", keyspace, index.view_table());
        let field_columns: Vec<String> = index.fields.iter().map(|f| f.column()).collect();

        let mut insert_columns: Vec<&str> = PARTITION_COLUMNS.to_vec();
        insert_columns.extend(field_columns.iter().map(String::as_str));
        insert_columns.extend(["id", "updated_at"]);
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            view,
            insert_columns.join(", "),
            vec!["?"; insert_columns.len()].join(", ")
        );

        let restrict = |columns: &[&str]| -> String {
            columns
                .iter()
                .map(|c| format!("{} = ?", c))
                .collect::<Vec<_>>()
                .join(" AND ")
        };

        let mut key_columns: Vec<&str> = PARTITION_COLUMNS.to_vec();
        key_columns.extend(field_columns.iter().map(String::as_str));
        key_columns.push("id");
        let delete = format!("DELETE FROM {} WHERE {}", view, restrict(&key_columns[..]));

        let lookups = (0..=field_columns.len())
            .map(|k| {
                let columns = &key_columns[..PARTITION_COLUMNS.len() + k];
                session.prepare(&format!("SELECT * FROM {} WHERE {}", view, restrict(columns)))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self {
            insert: session.prepare(&insert)?,
            delete: session.prepare(&delete)?,
            lookups,
            index,
        })
    }

    fn partition(&self) -> Vec<Value> {
        vec![
            self.index.table.database.as_str().into(),
            self.index.table.name.as_str().into(),
            self.index.name.as_str().into(),
        ]
    }

    fn bind_insert(&self, doc: &Document, key: Vec<Value>) -> Result<BoundStatement> {
        let mut values = self.partition();
        values.extend(key);
        values.push(doc.id.into());
        values.push(doc.updated_at.into());
        Ok(self.insert.bind(values)?)
    }

    fn bind_delete(&self, id: Uuid, key: Vec<Value>) -> Result<BoundStatement> {
        let mut values = self.partition();
        values.extend(key);
        values.push(id.into());
        Ok(self.delete.bind(values)?)
    }
}

/// Prepared view statements for every index of one table
#[derive(Debug)]
pub struct BucketedViewStatementFactory {
    table: TableReference,
    views: Vec<PreparedView>,
}

impl BucketedViewStatementFactory {
    /// Prepare statements for `indexes` of `table`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if an index belongs to another table, and
    /// `StorageFailure` if a view table does not exist.
    pub fn new(
        session: &dyn Session,
        keyspace: &str,
        table: TableReference,
        indexes: Vec<Index>,
    ) -> Result<Self> {
        let mut views = Vec::with_capacity(indexes.len());
        for index in indexes {
            if index.table != table {
                return Err(Error::invalid_input(format!(
                    "index '{}' belongs to {}, not {}",
                    index.name, index.table, table
                )));
            }
            views.push(PreparedView::prepare(session, keyspace, index)?);
        }
        debug!(%table, views = views.len(), "Prepared view statements");
        Ok(Self { table, views })
    }

    /// Table the views derive from
    pub fn table(&self) -> &TableReference {
        &self.table
    }

    /// Indexes in declaration order
    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.views.iter().map(|v| &v.index)
    }

    /// Index by name
    pub fn index(&self, name: &str) -> Result<&Index> {
        self.view(name).map(|v| &v.index)
    }

    fn view(&self, name: &str) -> Result<&PreparedView> {
        self.views
            .iter()
            .find(|v| v.index.name == name)
            .ok_or_else(|| {
                Error::invalid_input(format!("{} has no index named '{}'", self.table, name))
            })
    }

    fn check_table(&self, doc: &Document) -> Result<()> {
        if doc.table != self.table {
            return Err(Error::invalid_input(format!(
                "document {} belongs to {}, not {}",
                doc.id, doc.table, self.table
            )));
        }
        Ok(())
    }

    /// Projected key of `doc` under the named index
    pub fn index_key(&self, doc: &Document, index: &str) -> Result<Vec<Value>> {
        Ok(self.view(index)?.index.project(&doc.object))
    }

    /// One view insert per index
    pub fn create_statements(&self, doc: &Document) -> Result<Vec<BoundStatement>> {
        self.check_table(doc)?;
        self.views
            .iter()
            .map(|v| v.bind_insert(doc, v.index.project(&doc.object)))
            .collect()
    }

    /// Per index, a delete of the old key when the projection changed, then
    /// an insert of the new key
    ///
    /// The insert is always issued so the view row references the new
    /// version.
    pub fn update_statements(
        &self,
        previous: &Document,
        current: &Document,
    ) -> Result<Vec<BoundStatement>> {
        self.check_table(previous)?;
        self.check_table(current)?;
        let mut statements = Vec::with_capacity(self.views.len() * 2);
        for view in &self.views {
            let old_key = view.index.project(&previous.object);
            let new_key = view.index.project(&current.object);
            if old_key != new_key || previous.id != current.id {
                statements.push(view.bind_delete(previous.id, old_key)?);
            }
            statements.push(view.bind_insert(current, new_key)?);
        }
        Ok(statements)
    }

    /// One view delete per index
    pub fn delete_statements(&self, doc: &Document) -> Result<Vec<BoundStatement>> {
        self.check_table(doc)?;
        self.views
            .iter()
            .map(|v| v.bind_delete(doc.id, v.index.project(&doc.object)))
            .collect()
    }

    /// View insert for a single index and an explicit entry
    pub fn insert_entry(&self, index: &str, entry: &ViewEntry) -> Result<BoundStatement> {
        let view = self.view(index)?;
        let mut values = view.partition();
        values.extend(entry.key.iter().cloned());
        values.push(entry.id.into());
        values.push(entry.updated_at.into());
        Ok(view.insert.bind(values)?)
    }

    /// View delete for a single index and an explicit entry
    pub fn delete_entry(&self, index: &str, entry: &ViewEntry) -> Result<BoundStatement> {
        self.view(index)?.bind_delete(entry.id, entry.key.clone())
    }

    /// Select of every view row whose key starts with `prefix`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown index or a prefix longer than
    /// the field list, and `InvalidIdentifier` when prefix values do not
    /// match the field types.
    pub fn lookup_statement(&self, index: &str, prefix: &[Value]) -> Result<BoundStatement> {
        let view = self.view(index)?;
        let statement = view.lookups.get(prefix.len()).ok_or_else(|| {
            Error::invalid_input(format!(
                "index '{}' has {} fields, prefix has {}",
                index,
                view.index.fields.len(),
                prefix.len()
            ))
        })?;
        let mut values = view.partition();
        values.extend(prefix.iter().cloned());
        statement
            .bind(values)
            .map_err(|source| Error::InvalidIdentifier {
                identifier: Identifier::from_components(prefix.iter().cloned()).to_string(),
                source,
            })
    }
}
