//! In-process partitioned column-family store
//!
//! `MemoryCluster` implements [`Session`] over a set of simulated nodes. It
//! exists so the repository layer can be exercised end to end without a
//! network store, and it keeps the properties that layer relies on:
//!
//! - Partitions are hashed onto a token ring; each has exactly one owner node
//! - Requests whose bound values cover the partition key go straight to the
//!   owner ("direct"); everything else goes through a coordinator hop that
//!   touches every node it needs
//! - Conditional writes (`IF EXISTS` / `IF NOT EXISTS`) are atomic per
//!   partition and report whether they were applied
//! - A node marked down fails every request that needs it with
//!   [`StoreError::Unavailable`]
//!
//! Replication is not simulated: the replication options of
//! `CREATE KEYSPACE` are accepted and ignored.
//!
//! # Storage Layout
//!
//! ```text
//! Node
//!   └── partitions: DashMap<(table, encoded key), Partition>
//!                                                   └── rows: BTreeMap<clustering key, cells>
//! ```

mod catalog;
mod ring;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use docstore_core::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cql::{self, CreateTable, Order, Relation, Selection, Statement, TableName, Term};
use crate::error::{StoreError, StoreResult};
use crate::result::{ResultSet, Row};
use crate::session::{NodeId, Session};
use crate::statement::{BoundStatement, ColumnSpec, PreparedStatement};

pub use catalog::{Catalog, TableSchema};
pub use ring::{encode_key, token, TokenRing};

// ============================================================================
// Configuration
// ============================================================================

/// Topology of a memory cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of simulated nodes
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    /// Ring tokens per node
    #[serde(default = "default_vnodes")]
    pub vnodes: usize,
}

fn default_nodes() -> usize {
    3
}

fn default_vnodes() -> usize {
    16
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            vnodes: default_vnodes(),
        }
    }
}

// ============================================================================
// Nodes and partitions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartitionAddr {
    table: TableName,
    key: Vec<u8>,
}

/// Clustering key with a total order over its components
#[derive(Debug, Clone)]
struct ClusteringKey(Vec<Value>);

impl Ord for ClusteringKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| *o != CmpOrdering::Equal)
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for ClusteringKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ClusteringKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for ClusteringKey {}

#[derive(Debug)]
struct Partition {
    token: u64,
    /// Full rows, one value per table column
    rows: BTreeMap<ClusteringKey, Vec<Value>>,
}

#[derive(Debug)]
struct Node {
    id: NodeId,
    up: AtomicBool,
    direct: AtomicU64,
    coordinated: AtomicU64,
    partitions: DashMap<PartitionAddr, Partition>,
}

impl Node {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            up: AtomicBool::new(true),
            direct: AtomicU64::new(0),
            coordinated: AtomicU64::new(0),
            partitions: DashMap::new(),
        }
    }

    fn admit(&self, routed: bool) -> StoreResult<()> {
        if !self.up.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable { node: self.id });
        }
        let counter = if routed {
            &self.direct
        } else {
            &self.coordinated
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Per-node request and data counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    /// Node
    pub node: NodeId,
    /// Whether the node is up
    pub up: bool,
    /// Requests routed straight to this node by partition key
    pub direct_requests: u64,
    /// Requests reaching this node through a coordinator
    pub coordinated_requests: u64,
    /// Partitions stored on this node
    pub partitions: usize,
}

// ============================================================================
// MemoryCluster
// ============================================================================

/// In-process implementation of [`Session`]
///
/// # Example
///
/// ```ignore
/// let cluster = MemoryCluster::new(ClusterConfig::default());
/// cluster.execute_unprepared("CREATE KEYSPACE ks").await?;
/// ```
#[derive(Debug)]
pub struct MemoryCluster {
    ring: TokenRing,
    nodes: Vec<Node>,
    catalog: RwLock<Catalog>,
    statements: DashMap<u64, Arc<Statement>>,
    next_statement_id: AtomicU64,
}

impl MemoryCluster {
    /// Create a cluster with the given topology
    pub fn new(config: ClusterConfig) -> Self {
        let nodes = config.nodes.max(1);
        debug!(nodes, vnodes = config.vnodes, "Starting memory cluster");
        Self {
            ring: TokenRing::new(nodes, config.vnodes),
            nodes: (0..nodes).map(|n| Node::new(NodeId(n))).collect(),
            catalog: RwLock::new(Catalog::default()),
            statements: DashMap::new(),
            next_statement_id: AtomicU64::new(1),
        }
    }

    /// Single-node cluster
    pub fn single_node() -> Self {
        Self::new(ClusterConfig {
            nodes: 1,
            ..ClusterConfig::default()
        })
    }

    /// All node ids
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Mark a node up or down
    pub fn set_node_up(&self, node: NodeId, up: bool) {
        if let Some(n) = self.nodes.get(node.0) {
            debug!(%node, up, "Changing node state");
            n.up.store(up, Ordering::Release);
        }
    }

    /// Counters for every node
    pub fn stats(&self) -> Vec<NodeStats> {
        self.nodes
            .iter()
            .map(|n| NodeStats {
                node: n.id,
                up: n.up.load(Ordering::Acquire),
                direct_requests: n.direct.load(Ordering::Relaxed),
                coordinated_requests: n.coordinated.load(Ordering::Relaxed),
                partitions: n.partitions.len(),
            })
            .collect()
    }

    /// Zero the request counters
    pub fn reset_stats(&self) {
        for n in &self.nodes {
            n.direct.store(0, Ordering::Relaxed);
            n.coordinated.store(0, Ordering::Relaxed);
        }
    }

    /// Keyspace names
    pub fn keyspaces(&self) -> Vec<String> {
        self.catalog.read().keyspace_names()
    }

    /// True if `keyspace.table` exists
    pub fn has_table(&self, keyspace: &str, table: &str) -> bool {
        let name = TableName {
            keyspace: keyspace.to_ascii_lowercase(),
            table: table.to_ascii_lowercase(),
        };
        self.catalog.read().table(&name).is_ok()
    }

    /// Number of rows stored in `keyspace.table` across all nodes
    pub fn row_count(&self, keyspace: &str, table: &str) -> usize {
        let name = TableName {
            keyspace: keyspace.to_ascii_lowercase(),
            table: table.to_ascii_lowercase(),
        };
        self.nodes
            .iter()
            .flat_map(|n| {
                n.partitions
                    .iter()
                    .filter(|p| p.key().table == name)
                    .map(|p| p.value().rows.len())
                    .collect::<Vec<_>>()
            })
            .sum()
    }

    fn owner_of_key(&self, encoded: &[u8]) -> (u64, &Node) {
        let t = token(encoded);
        let owner = self.ring.owner(t);
        (t, &self.nodes[owner.0])
    }

    // ------------------------------------------------------------------------
    // Preparation
    // ------------------------------------------------------------------------

    fn describe(&self, statement: &Statement) -> StoreResult<(Vec<ColumnSpec>, Option<Vec<usize>>)> {
        let Some(table_name) = statement.table() else {
            return Ok((Vec::new(), None));
        };
        let schema = self.catalog.read().table(table_name)?;

        // (column, term) in marker order
        let bound: Vec<(&str, &Term)> = match statement {
            Statement::Insert {
                columns, values, ..
            } => columns
                .iter()
                .map(String::as_str)
                .zip(values.iter())
                .collect(),
            Statement::Update {
                assignments,
                relations,
                conditions,
                ..
            } => assignments
                .iter()
                .chain(relations.iter())
                .chain(conditions.iter())
                .map(|r| (r.column.as_str(), &r.term))
                .collect(),
            Statement::Select { relations, .. } | Statement::Delete { relations, .. } => relations
                .iter()
                .map(|r| (r.column.as_str(), &r.term))
                .collect(),
            _ => Vec::new(),
        };

        let mut variables = Vec::new();
        let mut marker_columns = Vec::new();
        for (column, term) in &bound {
            let data_type = schema.column_type(column)?;
            if let Term::Marker(_) = term {
                variables.push(ColumnSpec::new(*column, data_type));
                marker_columns.push(*column);
            }
        }

        // Routing key: the marker bound to each partition key column. Update
        // assignments never bind key columns, so only key positions match.
        let routing = schema
            .partition_key
            .iter()
            .map(|&pk| {
                let name = schema.columns[pk].name.as_str();
                marker_columns.iter().rposition(|c| *c == name)
            })
            .collect::<Option<Vec<usize>>>();

        Ok((variables, routing))
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn run(&self, statement: &Statement, values: &[Value], routed: bool) -> StoreResult<ResultSet> {
        let resolve = |term: &Term| -> StoreResult<Value> {
            match term {
                Term::Literal(v) => Ok(v.clone()),
                Term::Marker(i) => values.get(*i).cloned().ok_or_else(|| {
                    StoreError::invalid(format!("no value bound for marker {}", i))
                }),
            }
        };

        match statement {
            Statement::CreateKeyspace {
                name,
                if_not_exists,
            } => {
                let created = self.catalog.write().add_keyspace(name);
                if !created && !if_not_exists {
                    return Err(StoreError::AlreadyExists(format!("keyspace '{}'", name)));
                }
                debug!(keyspace = %name, created, "CREATE KEYSPACE");
                Ok(ResultSet::empty())
            }
            Statement::DropKeyspace { name, if_exists } => {
                let removed = self.catalog.write().remove_keyspace(name);
                match removed {
                    Some(tables) => {
                        for table in &tables {
                            self.purge(table);
                        }
                        debug!(keyspace = %name, tables = tables.len(), "DROP KEYSPACE");
                        Ok(ResultSet::empty())
                    }
                    None if *if_exists => Ok(ResultSet::empty()),
                    None => Err(StoreError::invalid(format!(
                        "keyspace '{}' does not exist",
                        name
                    ))),
                }
            }
            Statement::CreateTable(def) => self.create_table(def),
            Statement::DropTable { table, if_exists } => {
                let removed = self.catalog.write().remove_table(table);
                if removed {
                    self.purge(table);
                    debug!(%table, "DROP TABLE");
                    Ok(ResultSet::empty())
                } else if *if_exists {
                    Ok(ResultSet::empty())
                } else {
                    Err(StoreError::invalid(format!("table {} does not exist", table)))
                }
            }
            Statement::Insert {
                table,
                columns,
                values: terms,
                if_not_exists,
            } => {
                let schema = self.catalog.read().table(table)?;
                let mut assigned = Vec::with_capacity(columns.len());
                for (column, term) in columns.iter().zip(terms.iter()) {
                    assigned.push((schema.require_column(column)?, resolve(term)?));
                }
                let key = |index: usize| {
                    assigned
                        .iter()
                        .rfind(|(i, _)| *i == index)
                        .map(|(_, v)| v.clone())
                };
                let (pk, ck) = full_key(&schema, key)?;
                let condition = if *if_not_exists {
                    Condition::IfNotExists
                } else {
                    Condition::None
                };
                self.write_row(&schema, pk, ck, &assigned, condition, routed)
            }
            Statement::Update {
                table,
                assignments,
                relations,
                if_exists,
                conditions,
            } => {
                let schema = self.catalog.read().table(table)?;
                let mut assigned = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    let index = schema.require_column(&assignment.column)?;
                    if schema.is_key_column(index) {
                        return Err(StoreError::invalid(format!(
                            "cannot SET primary key column '{}'",
                            assignment.column
                        )));
                    }
                    assigned.push((index, resolve(&assignment.term)?));
                }
                let filters = resolve_relations(&schema, relations, &resolve)?;
                let (pk, ck) = full_key(&schema, |i| lookup(&filters, i))?;
                for (index, value) in &filters {
                    assigned.push((*index, value.clone()));
                }
                let condition = if *if_exists {
                    Condition::IfExists
                } else if !conditions.is_empty() {
                    let expected = resolve_relations(&schema, conditions, &resolve)?;
                    let on_key = expected.iter().find(|(i, _)| schema.is_key_column(*i));
                    if let Some((index, _)) = on_key {
                        return Err(StoreError::invalid(format!(
                            "IF condition on primary key column '{}'",
                            schema.columns[*index].name
                        )));
                    }
                    Condition::Columns(expected)
                } else {
                    Condition::None
                };
                self.write_row(&schema, pk, ck, &assigned, condition, routed)
            }
            Statement::Delete {
                table,
                relations,
                if_exists,
            } => {
                let schema = self.catalog.read().table(table)?;
                let filters = resolve_relations(&schema, relations, &resolve)?;
                self.delete(&schema, &filters, *if_exists, routed)
            }
            Statement::Select {
                table,
                selection,
                relations,
                limit,
            } => {
                let schema = self.catalog.read().table(table)?;
                let filters = resolve_relations(&schema, relations, &resolve)?;
                self.select(&schema, selection, &filters, *limit, routed)
            }
        }
    }

    fn create_table(&self, def: &CreateTable) -> StoreResult<ResultSet> {
        let schema = TableSchema::from_definition(def)?;
        let created = self.catalog.write().add_table(schema)?;
        if !created && !def.if_not_exists {
            return Err(StoreError::AlreadyExists(format!("table {}", def.table)));
        }
        debug!(table = %def.table, created, "CREATE TABLE");
        Ok(ResultSet::empty())
    }

    fn purge(&self, table: &TableName) {
        for node in &self.nodes {
            node.partitions.retain(|addr, _| &addr.table != table);
        }
    }

    fn write_row(
        &self,
        schema: &TableSchema,
        partition_key: Vec<Value>,
        clustering_key: Vec<Value>,
        assigned: &[(usize, Value)],
        condition: Condition,
        routed: bool,
    ) -> StoreResult<ResultSet> {
        let key_refs: Vec<&Value> = partition_key.iter().collect();
        let encoded = encode_key(&key_refs);
        let (t, node) = self.owner_of_key(&encoded);
        node.admit(routed)?;

        let addr = PartitionAddr {
            table: schema.name.clone(),
            key: encoded,
        };
        let ck = ClusteringKey(clustering_key);

        let mut partition = node.partitions.entry(addr).or_insert_with(|| Partition {
            token: t,
            rows: BTreeMap::new(),
        });
        let exists = partition.rows.contains_key(&ck);

        let applied = match &condition {
            Condition::IfNotExists => !exists,
            Condition::IfExists => exists,
            Condition::Columns(expected) => partition
                .rows
                .get(&ck)
                .is_some_and(|row| expected.iter().all(|(i, v)| row[*i] == *v)),
            Condition::None => true,
        };

        if applied {
            let width = schema.columns.len();
            let row = partition
                .rows
                .entry(ck)
                .or_insert_with(|| vec![Value::Null; width]);
            for (i, pk) in schema.partition_key.iter().enumerate() {
                row[*pk] = partition_key[i].clone();
            }
            for (index, value) in assigned {
                row[*index] = value.clone();
            }
        }
        let empty = partition.rows.is_empty();
        let addr = partition.key().clone();
        drop(partition);
        if empty {
            node.partitions.remove_if(&addr, |_, p| p.rows.is_empty());
        }

        trace!(table = %schema.name, applied, "write");
        Ok(match condition {
            Condition::None => ResultSet::empty(),
            _ => ResultSet::conditional(applied),
        })
    }

    fn delete(
        &self,
        schema: &TableSchema,
        filters: &[(usize, Value)],
        if_exists: bool,
        routed: bool,
    ) -> StoreResult<ResultSet> {
        let partition_key = partition_key(schema, filters)?.ok_or_else(|| {
            StoreError::invalid(format!(
                "DELETE on {} must restrict every partition key column",
                schema.name
            ))
        })?;

        let clustering: Vec<Option<Value>> = schema
            .clustering_key
            .iter()
            .map(|i| lookup(filters, *i))
            .collect();
        let bound = clustering.iter().filter(|v| v.is_some()).count();
        if bound != 0 && bound != clustering.len() {
            return Err(StoreError::invalid(format!(
                "DELETE on {} must restrict all clustering columns or none",
                schema.name
            )));
        }

        let key_refs: Vec<&Value> = partition_key.iter().collect();
        let encoded = encode_key(&key_refs);
        let (_, node) = self.owner_of_key(&encoded);
        node.admit(routed)?;
        let addr = PartitionAddr {
            table: schema.name.clone(),
            key: encoded,
        };

        let applied = if bound == 0 {
            node.partitions.remove(&addr).is_some()
        } else {
            let ck = ClusteringKey(clustering.into_iter().flatten().collect());
            let removed = match node.partitions.get_mut(&addr) {
                Some(mut partition) => partition.rows.remove(&ck).is_some(),
                None => false,
            };
            node.partitions.remove_if(&addr, |_, p| p.rows.is_empty());
            removed
        };

        trace!(table = %schema.name, applied, "delete");
        Ok(if if_exists {
            ResultSet::conditional(applied)
        } else {
            ResultSet::empty()
        })
    }

    fn select(
        &self,
        schema: &TableSchema,
        selection: &Selection,
        filters: &[(usize, Value)],
        limit: Option<usize>,
        routed: bool,
    ) -> StoreResult<ResultSet> {
        let projection: Vec<usize> = match selection {
            Selection::All => (0..schema.columns.len()).collect(),
            Selection::Columns(names) => names
                .iter()
                .map(|n| schema.require_column(n))
                .collect::<StoreResult<_>>()?,
        };
        let columns: Arc<[ColumnSpec]> = projection
            .iter()
            .map(|i| schema.columns[*i].clone())
            .collect::<Vec<_>>()
            .into();

        let matches = |row: &Vec<Value>| filters.iter().all(|(i, v)| &row[*i] == v);

        // (token, key, rows in clustering order)
        let mut partitions: Vec<(u64, Vec<u8>, Vec<Vec<Value>>)> = Vec::new();
        match partition_key(schema, filters)? {
            Some(pk) => {
                let key_refs: Vec<&Value> = pk.iter().collect();
                let encoded = encode_key(&key_refs);
                let (t, node) = self.owner_of_key(&encoded);
                node.admit(routed)?;
                let addr = PartitionAddr {
                    table: schema.name.clone(),
                    key: encoded,
                };
                if let Some(partition) = node.partitions.get(&addr) {
                    let rows = partition.rows.values().filter(|r| matches(r)).cloned().collect();
                    partitions.push((t, addr.key.clone(), rows));
                }
            }
            None => {
                for node in &self.nodes {
                    node.admit(false)?;
                }
                for node in &self.nodes {
                    for entry in node.partitions.iter() {
                        if entry.key().table != schema.name {
                            continue;
                        }
                        let rows: Vec<Vec<Value>> = entry
                            .value()
                            .rows
                            .values()
                            .filter(|r| matches(r))
                            .cloned()
                            .collect();
                        if !rows.is_empty() {
                            partitions.push((entry.value().token, entry.key().key.clone(), rows));
                        }
                    }
                }
                partitions.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
            }
        }

        let descending = schema.clustering_order.iter().any(|o| *o == Order::Desc);
        let mut rows = Vec::new();
        for (_, _, mut partition_rows) in partitions {
            if descending {
                partition_rows.sort_by(|a, b| clustering_cmp(schema, a, b));
            }
            rows.extend(partition_rows);
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        let rows = rows
            .into_iter()
            .map(|full| {
                let values = projection.iter().map(|i| full[*i].clone()).collect();
                Row::new(columns.clone(), values)
            })
            .collect();
        Ok(ResultSet::with_rows(rows))
    }
}

#[derive(Debug, Clone)]
enum Condition {
    None,
    IfExists,
    IfNotExists,
    /// Row exists and each `(column, value)` matches
    Columns(Vec<(usize, Value)>),
}

fn lookup(filters: &[(usize, Value)], index: usize) -> Option<Value> {
    filters
        .iter()
        .rfind(|(i, _)| *i == index)
        .map(|(_, v)| v.clone())
}

fn resolve_relations(
    schema: &TableSchema,
    relations: &[Relation],
    resolve: &dyn Fn(&Term) -> StoreResult<Value>,
) -> StoreResult<Vec<(usize, Value)>> {
    relations
        .iter()
        .map(|r| Ok((schema.require_column(&r.column)?, resolve(&r.term)?)))
        .collect()
}

/// Partition key values if every partition key column is restricted
fn partition_key(schema: &TableSchema, filters: &[(usize, Value)]) -> StoreResult<Option<Vec<Value>>> {
    let values: Option<Vec<Value>> = schema
        .partition_key
        .iter()
        .map(|i| lookup(filters, *i))
        .collect();
    if let Some(values) = &values {
        if let Some(pos) = values.iter().position(Value::is_null) {
            let column = &schema.columns[schema.partition_key[pos]].name;
            return Err(StoreError::invalid(format!(
                "partition key part '{}' cannot be null",
                column
            )));
        }
    }
    Ok(values)
}

/// Full primary key for a row write; clustering values may be null
fn full_key(
    schema: &TableSchema,
    value_of: impl Fn(usize) -> Option<Value>,
) -> StoreResult<(Vec<Value>, Vec<Value>)> {
    let missing = |i: usize| {
        StoreError::invalid(format!(
            "missing primary key column '{}' for {}",
            schema.columns[i].name, schema.name
        ))
    };

    let mut pk = Vec::with_capacity(schema.partition_key.len());
    for &i in &schema.partition_key {
        let value = value_of(i).ok_or_else(|| missing(i))?;
        if value.is_null() {
            return Err(StoreError::invalid(format!(
                "partition key part '{}' cannot be null",
                schema.columns[i].name
            )));
        }
        pk.push(value);
    }

    let mut ck = Vec::with_capacity(schema.clustering_key.len());
    for &i in &schema.clustering_key {
        ck.push(value_of(i).ok_or_else(|| missing(i))?);
    }
    Ok((pk, ck))
}

fn clustering_cmp(schema: &TableSchema, a: &[Value], b: &[Value]) -> CmpOrdering {
    for (slot, &i) in schema.clustering_key.iter().enumerate() {
        let ord = a[i].total_cmp(&b[i]);
        let ord = match schema.clustering_order[slot] {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

#[async_trait]
impl Session for MemoryCluster {
    fn prepare(&self, query: &str) -> StoreResult<PreparedStatement> {
        let statement = cql::parse(query)?;
        let (variables, routing) = self.describe(&statement)?;
        let id = self.next_statement_id.fetch_add(1, Ordering::Relaxed);
        self.statements.insert(id, Arc::new(statement));
        trace!(id, query, "prepared");
        Ok(PreparedStatement::new(id, query, variables, routing))
    }

    async fn execute(&self, statement: BoundStatement) -> StoreResult<ResultSet> {
        let parsed = self
            .statements
            .get(&statement.prepared().id())
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| {
                StoreError::invalid(format!(
                    "unknown prepared statement {}",
                    statement.prepared().id()
                ))
            })?;
        let routed = statement.routing_key().is_some();
        self.run(&parsed, statement.values(), routed)
    }

    async fn execute_unprepared(&self, query: &str) -> StoreResult<ResultSet> {
        let statement = cql::parse(query)?;
        if statement.marker_count() > 0 {
            return Err(StoreError::invalid(
                "bind markers are not allowed in unprepared statements",
            ));
        }
        self.run(&statement, &[], false)
    }

    fn owner_of(&self, routing_key: &[&Value]) -> Option<NodeId> {
        let t = token(&encode_key(routing_key));
        Some(self.ring.owner(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn cluster() -> MemoryCluster {
        let cluster = MemoryCluster::new(ClusterConfig {
            nodes: 3,
            vnodes: 8,
        });
        block_on(async {
            cluster.execute_unprepared("CREATE KEYSPACE ks").await.unwrap();
            cluster
                .execute_unprepared(
                    "CREATE TABLE ks.t (p text, c bigint, v text, PRIMARY KEY ((p), c)) \
                     WITH CLUSTERING ORDER BY (c DESC)",
                )
                .await
                .unwrap();
        });
        cluster
    }

    fn exec(cluster: &MemoryCluster, cql: &str, values: Vec<Value>) -> StoreResult<ResultSet> {
        let prepared = cluster.prepare(cql)?;
        let bound = prepared.bind(values)?;
        block_on(cluster.execute(bound))
    }

    #[test]
    fn test_insert_if_not_exists_applies_once() {
        let c = cluster();
        let insert = "INSERT INTO ks.t (p, c, v) VALUES (?, ?, ?) IF NOT EXISTS";
        let first = exec(&c, insert, vec!["a".into(), 1i64.into(), "x".into()]).unwrap();
        let second = exec(&c, insert, vec!["a".into(), 1i64.into(), "y".into()]).unwrap();
        assert!(first.was_applied());
        assert!(!second.was_applied());

        let rs = exec(&c, "SELECT v FROM ks.t WHERE p = ? AND c = ?", vec!["a".into(), 1i64.into()])
            .unwrap();
        assert_eq!(rs.one().unwrap().get_text("v").unwrap(), Some("x"));
    }

    #[test]
    fn test_update_if_exists_requires_row() {
        let c = cluster();
        let update = "UPDATE ks.t SET v = ? WHERE p = ? AND c = ? IF EXISTS";
        let rs = exec(&c, update, vec!["z".into(), "a".into(), 1i64.into()]).unwrap();
        assert!(!rs.was_applied());
        assert_eq!(c.row_count("ks", "t"), 0);
    }

    #[test]
    fn test_update_column_condition_is_compare_and_set() {
        let c = cluster();
        exec(
            &c,
            "INSERT INTO ks.t (p, c) VALUES (?, ?)",
            vec!["a".into(), 1i64.into()],
        )
        .unwrap();
        let claim = "UPDATE ks.t SET v = ? WHERE p = ? AND c = ? IF v = null";
        let first = exec(&c, claim, vec!["x".into(), "a".into(), 1i64.into()]).unwrap();
        let second = exec(&c, claim, vec!["y".into(), "a".into(), 1i64.into()]).unwrap();
        assert!(first.was_applied());
        assert!(!second.was_applied());

        let release = "UPDATE ks.t SET v = null WHERE p = ? AND c = ? IF v = ?";
        let wrong = exec(&c, release, vec!["a".into(), 1i64.into(), "y".into()]).unwrap();
        assert!(!wrong.was_applied());
        let right = exec(&c, release, vec!["a".into(), 1i64.into(), "x".into()]).unwrap();
        assert!(right.was_applied());

        // no row, no match
        let missing = exec(&c, claim, vec!["x".into(), "b".into(), 1i64.into()]).unwrap();
        assert!(!missing.was_applied());
        assert_eq!(c.row_count("ks", "t"), 1);
    }

    #[test]
    fn test_update_condition_on_key_rejected() {
        let c = cluster();
        let err = exec(
            &c,
            "UPDATE ks.t SET v = ? WHERE p = ? AND c = ? IF c = ?",
            vec!["x".into(), "a".into(), 1i64.into(), 1i64.into()],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)), "{err:?}");
    }

    #[test]
    fn test_clustering_order_desc() {
        let c = cluster();
        for n in [1i64, 3, 2] {
            exec(
                &c,
                "INSERT INTO ks.t (p, c, v) VALUES (?, ?, ?)",
                vec!["a".into(), n.into(), "v".into()],
            )
            .unwrap();
        }
        let rs = exec(&c, "SELECT c FROM ks.t WHERE p = ?", vec!["a".into()]).unwrap();
        let order: Vec<i64> = rs.rows().iter().map(|r| r.get("c").unwrap().as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 2, 1]);

        let latest = exec(&c, "SELECT c FROM ks.t WHERE p = ? LIMIT 1", vec!["a".into()]).unwrap();
        assert_eq!(latest.len(), 1);
    }

    #[test]
    fn test_delete_if_exists() {
        let c = cluster();
        exec(
            &c,
            "INSERT INTO ks.t (p, c, v) VALUES (?, ?, ?)",
            vec!["a".into(), 1i64.into(), "v".into()],
        )
        .unwrap();
        let delete = "DELETE FROM ks.t WHERE p = ? AND c = ? IF EXISTS";
        assert!(exec(&c, delete, vec!["a".into(), 1i64.into()]).unwrap().was_applied());
        assert!(!exec(&c, delete, vec!["a".into(), 1i64.into()]).unwrap().was_applied());
        assert_eq!(c.stats().iter().map(|s| s.partitions).sum::<usize>(), 0);
    }

    #[test]
    fn test_routing_key_goes_direct() {
        let c = cluster();
        c.reset_stats();
        let prepared = c.prepare("SELECT * FROM ks.t WHERE p = ?").unwrap();
        assert_eq!(prepared.routing_key_indexes(), Some(&[0usize][..]));
        let bound = prepared.bind(vec!["a".into()]).unwrap();
        let owner = c.owner_of(&[&Value::from("a")]).unwrap();
        block_on(c.execute(bound)).unwrap();

        let stats = c.stats();
        assert_eq!(stats[owner.0].direct_requests, 1);
        assert_eq!(stats.iter().map(|s| s.direct_requests).sum::<u64>(), 1);
    }

    #[test]
    fn test_scan_touches_every_node() {
        let c = cluster();
        c.reset_stats();
        exec(&c, "SELECT * FROM ks.t", vec![]).unwrap();
        assert!(c.stats().iter().all(|s| s.coordinated_requests == 1));
    }

    #[test]
    fn test_down_node_is_unavailable() {
        let c = cluster();
        let owner = c.owner_of(&[&Value::from("a")]).unwrap();
        c.set_node_up(owner, false);
        let err = exec(&c, "SELECT * FROM ks.t WHERE p = ?", vec!["a".into()]).unwrap_err();
        assert_eq!(err, StoreError::Unavailable { node: owner });
    }

    #[test]
    fn test_null_partition_key_rejected() {
        let c = cluster();
        let err = exec(
            &c,
            "INSERT INTO ks.t (p, c, v) VALUES (?, ?, ?)",
            vec![Value::Null, 1i64.into(), "v".into()],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_prepare_unknown_table() {
        let c = cluster();
        assert!(matches!(
            c.prepare("SELECT * FROM ks.nope"),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_create_twice_without_if_not_exists() {
        let c = cluster();
        let err = block_on(c.execute_unprepared("CREATE KEYSPACE ks")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(block_on(c.execute_unprepared("CREATE KEYSPACE IF NOT EXISTS ks")).is_ok());
    }

    #[test]
    fn test_drop_keyspace_purges_data() {
        let c = cluster();
        exec(
            &c,
            "INSERT INTO ks.t (p, c, v) VALUES (?, ?, ?)",
            vec!["a".into(), 1i64.into(), "v".into()],
        )
        .unwrap();
        block_on(c.execute_unprepared("DROP KEYSPACE ks")).unwrap();
        assert!(!c.has_table("ks", "t"));
        assert_eq!(c.row_count("ks", "t"), 0);
        assert!(block_on(c.execute_unprepared("DROP TABLE IF EXISTS ks.t")).is_ok());
    }
}
