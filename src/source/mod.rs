//! Result source interfaces.
//!
//! Ownership model:
//! - `ResultSource` is the query collaborator: it answers key-range and
//!   single-assay questions and returns rows already unified into
//!   `RawResultRow`.
//! - `InMemorySource` holds both row shapes in memory; it backs tests and
//!   filesystem dumps (see `transport::fs`).

use std::ops::Range;

use tracing::{debug, warn};

use crate::data::{AssayShape, GelResultRow, InsituResultRow, RawResultRow};
use crate::errors::CacheError;
use crate::types::{AssayKey, SourceId};

/// Utility helpers used by the cache drivers.
pub mod utilities;

/// Which assays a fetch covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchScope {
    /// Every assay.
    All,
    /// One assay.
    Assay(AssayKey),
    /// Assays whose key lies in the half-open range.
    Range(Range<AssayKey>),
}

impl FetchScope {
    /// True when `assay_key` falls inside this scope.
    pub fn contains(&self, assay_key: AssayKey) -> bool {
        match self {
            FetchScope::All => true,
            FetchScope::Assay(key) => *key == assay_key,
            FetchScope::Range(range) => range.contains(&assay_key),
        }
    }
}

/// Query collaborator consumed by the reload and update drivers.
///
/// For a fixed database state, `fetch` must return rows in a stable order.
pub trait ResultSource {
    /// Stable identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Largest assay key with results of either shape, or `None` when empty.
    fn max_assay_key(&self) -> Result<Option<AssayKey>, CacheError>;

    /// Shapes with results for `assay_key`, in [`AssayShape::ALL`] order.
    ///
    /// Empty when the assay has no results. An assay normally has exactly one
    /// shape; a source may report both, and callers then process both.
    fn assay_shapes(&self, assay_key: AssayKey) -> Result<Vec<AssayShape>, CacheError>;

    /// Rows of one shape within `scope`.
    fn fetch(
        &self,
        shape: AssayShape,
        scope: &FetchScope,
    ) -> Result<Vec<RawResultRow>, CacheError>;
}

/// In-memory result source for tests and file dumps.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    id: SourceId,
    insitu: Vec<InsituResultRow>,
    gel: Vec<GelResultRow>,
}

impl InMemorySource {
    /// Create a source from prebuilt rows of both shapes.
    pub fn new(
        id: impl Into<SourceId>,
        insitu: Vec<InsituResultRow>,
        gel: Vec<GelResultRow>,
    ) -> Self {
        Self {
            id: id.into(),
            insitu,
            gel,
        }
    }

    /// Number of rows held for `shape`.
    pub fn row_count(&self, shape: AssayShape) -> usize {
        match shape {
            AssayShape::Insitu => self.insitu.len(),
            AssayShape::Gel => self.gel.len(),
        }
    }
}

/// Reject rows a source returned outside the scope it was asked for.
pub fn ensure_in_scope(
    source_id: &str,
    scope: &FetchScope,
    rows: &[RawResultRow],
) -> Result<(), CacheError> {
    match rows.iter().find(|row| !scope.contains(row.assay_key)) {
        Some(row) => Err(CacheError::SourceInconsistent {
            source_id: source_id.to_string(),
            details: format!(
                "{} row for assay {} returned for scope {:?}",
                row.shape.as_str(),
                row.assay_key,
                scope
            ),
        }),
        None => Ok(()),
    }
}

impl ResultSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn max_assay_key(&self) -> Result<Option<AssayKey>, CacheError> {
        let insitu = self.insitu.iter().map(|row| row.assay_key);
        let gel = self.gel.iter().map(|row| row.assay_key);
        Ok(insitu.chain(gel).max())
    }

    fn assay_shapes(&self, assay_key: AssayKey) -> Result<Vec<AssayShape>, CacheError> {
        let shapes: Vec<AssayShape> = AssayShape::ALL
            .into_iter()
            .filter(|shape| match shape {
                AssayShape::Insitu => self.insitu.iter().any(|row| row.assay_key == assay_key),
                AssayShape::Gel => self.gel.iter().any(|row| row.assay_key == assay_key),
            })
            .collect();
        if shapes.len() > 1 {
            warn!(
                "[gxd:source] source='{}' assay {} has both specimen and gel lane results",
                self.id, assay_key
            );
        }
        Ok(shapes)
    }

    fn fetch(
        &self,
        shape: AssayShape,
        scope: &FetchScope,
    ) -> Result<Vec<RawResultRow>, CacheError> {
        let rows: Vec<RawResultRow> = match shape {
            AssayShape::Insitu => self
                .insitu
                .iter()
                .filter(|row| scope.contains(row.assay_key))
                .cloned()
                .map(RawResultRow::from)
                .collect(),
            AssayShape::Gel => self
                .gel
                .iter()
                .filter(|row| scope.contains(row.assay_key))
                .cloned()
                .map(RawResultRow::from)
                .collect(),
        };
        debug!(
            "[gxd:source] source='{}' shape={} scope={:?} rows={}",
            self.id,
            shape.as_str(),
            scope,
            rows.len()
        );
        Ok(rows)
    }
}
