//! View repair
//!
//! Recomputes one index's projection of every current document and brings
//! the view table in line: rows that no current document projects to are
//! deleted, and missing or outdated rows are written. This is a maintenance
//! operation and never runs on the write path.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use docstore_storage::Session;
use serde::Serialize;
use tracing::{info, warn};

use super::{BucketedViewStatementFactory, ViewEntry};
use crate::entity::Document;
use crate::error::Result;

/// What a reconciliation pass found and fixed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Index that was reconciled
    pub index: String,
    /// Current documents scanned
    pub documents: usize,
    /// View rows found before repair
    pub view_rows: usize,
    /// Rows written (missing or pointing at an old version)
    pub inserted: usize,
    /// Stale rows deleted
    pub removed: usize,
}

impl ReconcileReport {
    /// True if the view already matched
    pub fn is_clean(&self) -> bool {
        self.inserted == 0 && self.removed == 0
    }
}

/// Row key within a view partition: `(key, id)` under the store's total order
struct Slot<'a>(&'a ViewEntry);

impl Slot<'_> {
    fn cmp_key(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.0.key, &other.0.key);
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    }

    /// Same row and same document version
    fn matches(&self, other: &Self) -> bool {
        self == other && self.0.updated_at == other.0.updated_at
    }
}

impl PartialEq for Slot<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot<'_> {}

impl PartialOrd for Slot<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other).then_with(|| self.0.id.cmp(&other.0.id))
    }
}

/// Rows to delete and rows to write so that `actual` becomes `expected`
fn diff<'a>(
    expected: &'a [ViewEntry],
    actual: &'a [ViewEntry],
) -> (Vec<&'a ViewEntry>, Vec<&'a ViewEntry>) {
    let wanted: BTreeSet<Slot<'a>> = expected.iter().map(Slot).collect();
    let mut present: BTreeMap<Slot<'a>, &'a ViewEntry> = BTreeMap::new();
    let mut stale = Vec::new();
    for entry in actual {
        if wanted.contains(&Slot(entry)) {
            present.insert(Slot(entry), entry);
        } else {
            stale.push(entry);
        }
    }
    let missing = expected
        .iter()
        .filter(|&entry| {
            !present
                .get(&Slot(entry))
                .is_some_and(|&found| Slot(found).matches(&Slot(entry)))
        })
        .collect();
    (stale, missing)
}

/// Reconcile the view of `index` against `documents`
///
/// `documents` must hold exactly the current version of every document in
/// the table.
pub async fn reconcile(
    session: &dyn Session,
    views: &BucketedViewStatementFactory,
    index: &str,
    documents: &[Document],
) -> Result<ReconcileReport> {
    let definition = views.index(index)?;
    let result = session.execute(views.lookup_statement(index, &[])?).await?;
    let actual = result
        .rows()
        .iter()
        .map(|row| ViewEntry::from_row(definition, row))
        .collect::<docstore_storage::StoreResult<Vec<_>>>()?;

    let expected: Vec<ViewEntry> = documents
        .iter()
        .map(|doc| ViewEntry {
            key: definition.project(&doc.object),
            id: doc.id,
            updated_at: doc.updated_at,
        })
        .collect();

    let mut report = ReconcileReport {
        index: index.to_string(),
        documents: documents.len(),
        view_rows: actual.len(),
        ..ReconcileReport::default()
    };

    let (stale, missing) = diff(&expected, &actual);
    for entry in stale {
        warn!(index, id = %entry.id, "Removing stale view row");
        session.execute(views.delete_entry(index, entry)?).await?;
        report.removed += 1;
    }
    for entry in missing {
        warn!(index, id = %entry.id, "Writing missing view row");
        session.execute(views.insert_entry(index, entry)?).await?;
        report.inserted += 1;
    }

    info!(
        index,
        documents = report.documents,
        inserted = report.inserted,
        removed = report.removed,
        "Reconciled view"
    );
    Ok(report)
}
