//! Bucketed views: secondary indexes as derived tables
//!
//! Each [`Index`](crate::entity::Index) owns one view table:
//!
//! ```text
//! ix_<db>__<table>__<index>
//!   (db_name, tbl_name, ix_name)   partition: one per index
//!   f_<field>..., id               clustering: declared field order, then id
//!   updated_at                     completes the base document identifier
//! ```
//!
//! View rows are written after the base row and are not atomic with it.
//! [`reconcile`] repairs any drift.

mod factory;
pub mod reconcile;
mod schema;

pub use factory::{BucketedViewStatementFactory, ViewEntry};
pub use reconcile::ReconcileReport;
pub use schema::BucketedViewSchema;

/// Partition columns shared by every view table
pub(crate) const PARTITION_COLUMNS: [&str; 3] = ["db_name", "tbl_name", "ix_name"];
