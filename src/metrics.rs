use crate::data::AssayShape;
use crate::types::{AssayKey, ExpressionKey};

/// Counters for one full-reload batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Inclusive start of the assay key range.
    pub start: AssayKey,
    /// Exclusive end of the assay key range.
    pub end: AssayKey,
    pub insitu_rows: usize,
    pub gel_rows: usize,
    pub groups: usize,
    pub records: usize,
    /// Rows that produced at least one anomaly diagnostic.
    pub anomalies: usize,
}

impl BatchStats {
    /// Source rows read in this batch across both shapes.
    pub fn rows(&self) -> usize {
        self.insitu_rows + self.gel_rows
    }
}

/// Outcome of a full reload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReloadSummary {
    /// Largest assay key reported by the source (`None` when it is empty).
    pub max_assay_key: Option<AssayKey>,
    pub batches: Vec<BatchStats>,
    /// Identifier of the first emitted row.
    pub first_key: Option<ExpressionKey>,
    /// Identifier of the last emitted row.
    pub last_key: Option<ExpressionKey>,
}

impl ReloadSummary {
    /// Rows read for `shape` across every batch.
    pub fn rows(&self, shape: AssayShape) -> usize {
        self.batches
            .iter()
            .map(|batch| match shape {
                AssayShape::Insitu => batch.insitu_rows,
                AssayShape::Gel => batch.gel_rows,
            })
            .sum()
    }

    pub fn groups(&self) -> usize {
        self.batches.iter().map(|batch| batch.groups).sum()
    }

    pub fn records(&self) -> usize {
        self.batches.iter().map(|batch| batch.records).sum()
    }

    pub fn anomalies(&self) -> usize {
        self.batches.iter().map(|batch| batch.anomalies).sum()
    }

    /// Mean source rows folded into each cache record (0.0 when nothing was built).
    pub fn rows_per_record(&self) -> f64 {
        let records = self.records();
        if records == 0 {
            return 0.0;
        }
        let rows = self.rows(AssayShape::Insitu) + self.rows(AssayShape::Gel);
        rows as f64 / records as f64
    }

    /// Batch that produced the most records (earliest wins ties).
    pub fn busiest_batch(&self) -> Option<&BatchStats> {
        self.batches
            .iter()
            .rev()
            .max_by_key(|batch| batch.records)
    }
}

/// Outcome of a single-assay update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateSummary {
    pub assay_key: AssayKey,
    /// Shapes rebuilt for the assay; empty when it no longer has results.
    pub shapes: Vec<AssayShape>,
    pub rows_read: usize,
    /// Stale cache rows removed.
    pub deleted: usize,
    /// Cache rows inserted.
    pub inserted: usize,
    /// Identifier of the first inserted row.
    pub first_key: Option<ExpressionKey>,
}
