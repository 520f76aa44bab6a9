//! Incremental update: replace one assay's cache rows in a single unit of work.

use tracing::{info, warn};

use crate::builder::{AssayResultIndex, build_record, row_anomalies};
use crate::config::CacheConfig;
use crate::data::{AssayShape, CacheRecord, CacheRow, ResultGroup};
use crate::errors::CacheError;
use crate::metrics::UpdateSummary;
use crate::source::utilities::grouping::group_rows;
use crate::source::{FetchScope, ResultSource, ensure_in_scope};
use crate::store::CacheTable;
use crate::types::{AssayKey, ExpressionKey};

/// Rebuilds the cache rows of single assays against a `CacheTable`.
pub struct IncrementalUpdater<'a, S: ResultSource + ?Sized> {
    source: &'a S,
    config: CacheConfig,
}

impl<'a, S: ResultSource + ?Sized> IncrementalUpdater<'a, S> {
    /// Validate `config` and prepare an updater over `source`.
    pub fn new(source: &'a S, config: CacheConfig) -> Result<Self, CacheError> {
        Ok(Self {
            source,
            config: config.validated()?,
        })
    }

    /// Delete and re-insert the cache rows of `assay_key`.
    ///
    /// An assay without results still has its stale rows deleted. Failures
    /// roll the unit of work back and name the assay.
    pub fn update<T: CacheTable + ?Sized>(
        &self,
        table: &mut T,
        assay_key: AssayKey,
    ) -> Result<UpdateSummary, CacheError> {
        self.update_assay(table, assay_key)
            .map_err(|err| err.in_update(assay_key))
    }

    fn update_assay<T: CacheTable + ?Sized>(
        &self,
        table: &mut T,
        assay_key: AssayKey,
    ) -> Result<UpdateSummary, CacheError> {
        if assay_key <= 0 {
            return Err(CacheError::Configuration(format!(
                "incremental update needs a positive assay key (got {assay_key})"
            )));
        }
        let shapes = self.source.assay_shapes(assay_key)?;
        let scope = FetchScope::Assay(assay_key);
        let mut rows_read = 0;
        let mut groups: Vec<ResultGroup> = Vec::new();
        for &shape in &shapes {
            let rows = self.source.fetch(shape, &scope)?;
            ensure_in_scope(self.source.id(), &scope, &rows)?;
            rows_read += rows.len();
            for message in rows.iter().flat_map(row_anomalies) {
                warn!("[gxd:update] {}", message);
            }
            groups.extend(group_rows(rows, self.config.group_fields(shape)).into_values());
        }
        let index = AssayResultIndex::from_groups(groups.iter());
        let records: Vec<CacheRecord> = groups
            .iter()
            .map(|group| build_record(group, &index, false, self.config.recombinase_rule))
            .collect();

        let base = table.max_expression_key()?.unwrap_or(0);
        let first_key = base + 1;
        let rows: Vec<CacheRow> = records
            .into_iter()
            .zip(first_key..)
            .map(|(record, key)| CacheRow::new(key, record))
            .collect();

        table.begin()?;
        let deleted = match replace_rows(table, assay_key, &rows) {
            Ok(deleted) => deleted,
            Err(err) => {
                if let Err(rollback_err) = table.rollback() {
                    warn!(
                        "[gxd:update] rollback for assay {} failed: {}",
                        assay_key, rollback_err
                    );
                }
                return Err(err);
            }
        };

        let summary = UpdateSummary {
            assay_key,
            shapes,
            rows_read,
            deleted,
            inserted: rows.len(),
            first_key: if rows.is_empty() { None } else { Some(first_key) },
        };
        let shape_labels: Vec<&str> = summary.shapes.iter().map(AssayShape::as_str).collect();
        info!(
            "[gxd:update] assay {} ({}): deleted={} inserted={} first_key={:?}",
            assay_key,
            if shape_labels.is_empty() {
                "no results".to_string()
            } else {
                shape_labels.join("+")
            },
            summary.deleted,
            summary.inserted,
            summary.first_key
        );
        Ok(summary)
    }
}

fn replace_rows<T: CacheTable + ?Sized>(
    table: &mut T,
    assay_key: AssayKey,
    rows: &[CacheRow],
) -> Result<usize, CacheError> {
    let deleted = table.delete_assay(assay_key)?;
    for row in rows {
        table.insert(row)?;
    }
    table.commit()?;
    Ok(deleted)
}

/// Run one incremental update of `assay_key` against `table`.
pub fn update_assay<S, T>(
    source: &S,
    config: CacheConfig,
    table: &mut T,
    assay_key: AssayKey,
) -> Result<UpdateSummary, CacheError>
where
    S: ResultSource + ?Sized,
    T: CacheTable + ?Sized,
{
    IncrementalUpdater::new(source, config)?.update(table, assay_key)
}

/// Next identifier a table would hand out.
pub fn next_expression_key<T: CacheTable + ?Sized>(table: &T) -> Result<ExpressionKey, CacheError> {
    Ok(table.max_expression_key()?.unwrap_or(0) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GelResultRow, InsituResultRow};
    use crate::source::InMemorySource;
    use crate::store::InMemoryCacheTable;

    fn insitu(assay_key: AssayKey, result_key: i64, structure_key: i64) -> InsituResultRow {
        InsituResultRow {
            assay_key,
            refs_key: 1,
            assay_type_key: 9,
            genotype_key: Some(2),
            marker_key: 3,
            structure_key,
            emaps_key: Some(4),
            stage_key: Some(5),
            strength: "Present".into(),
            age: "postnatal day 21".into(),
            age_min: None,
            age_max: Some(21.0),
            specimen_key: 6,
            sex: None,
            result_key,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: Some("lacZ".into()),
            has_driver: true,
            result_note: None,
        }
    }

    /// Table whose inserts fail after a fixed number of successes.
    struct BrokenTable {
        inner: InMemoryCacheTable,
        inserts_left: usize,
        rolled_back: bool,
    }

    impl CacheTable for BrokenTable {
        fn max_expression_key(&self) -> Result<Option<ExpressionKey>, CacheError> {
            self.inner.max_expression_key()
        }
        fn begin(&mut self) -> Result<(), CacheError> {
            self.inner.begin()
        }
        fn delete_assay(&mut self, assay_key: AssayKey) -> Result<usize, CacheError> {
            self.inner.delete_assay(assay_key)
        }
        fn insert(&mut self, row: &CacheRow) -> Result<(), CacheError> {
            if self.inserts_left == 0 {
                return Err(CacheError::Sink("statement timed out".into()));
            }
            self.inserts_left -= 1;
            self.inner.insert(row)
        }
        fn commit(&mut self) -> Result<(), CacheError> {
            self.inner.commit()
        }
        fn rollback(&mut self) -> Result<(), CacheError> {
            self.rolled_back = true;
            self.inner.rollback()
        }
    }

    #[test]
    fn update_numbers_after_the_persisted_max() {
        let source =
            InMemorySource::new("test", vec![insitu(8, 1, 10), insitu(8, 2, 11)], Vec::new());
        let mut table = InMemoryCacheTable::default();
        let updater = IncrementalUpdater::new(&source, CacheConfig::default()).unwrap();

        let first = updater.update(&mut table, 8).unwrap();
        assert_eq!(first.shapes, vec![AssayShape::Insitu]);
        assert_eq!(first.first_key, Some(1));
        assert_eq!(first.inserted, 2);
        assert_eq!(first.deleted, 0);

        let second = updater.update(&mut table, 8).unwrap();
        assert_eq!(second.deleted, 2);
        assert_eq!(second.first_key, Some(3));
        let rows = table.reader().rows_for_assay(8);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.record.is_recombinase));
        assert!(rows.iter().all(|row| row.record.is_for_gxd));
        assert_eq!(rows[0].record.age_min, None);
        assert_eq!(next_expression_key(&table).unwrap(), 5);
    }

    #[test]
    fn unknown_assay_still_deletes_stale_rows() {
        let populated = InMemorySource::new("test", vec![insitu(8, 1, 10)], Vec::new());
        let mut table = InMemoryCacheTable::default();
        update_assay(&populated, CacheConfig::default(), &mut table, 8).unwrap();
        assert_eq!(table.reader().len(), 1);

        let emptied = InMemorySource::default();
        let summary = update_assay(&emptied, CacheConfig::default(), &mut table, 8).unwrap();
        assert!(summary.shapes.is_empty());
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.first_key, None);
        assert!(table.reader().is_empty());
    }

    #[test]
    fn failed_insert_rolls_back() {
        let source =
            InMemorySource::new("test", vec![insitu(8, 1, 10), insitu(8, 2, 11)], Vec::new());
        let mut table = BrokenTable {
            inner: InMemoryCacheTable::default(),
            inserts_left: 2,
            rolled_back: false,
        };
        update_assay(&source, CacheConfig::default(), &mut table, 8).unwrap();
        let before = table.inner.reader().rows();

        table.inserts_left = 1;
        let err = update_assay(&source, CacheConfig::default(), &mut table, 8).unwrap_err();
        assert!(matches!(err, CacheError::Update { assay_key: 8, .. }));
        assert!(table.rolled_back);
        assert_eq!(table.inner.reader().rows(), before);
        table.inner.begin().unwrap();
    }

    #[test]
    fn assay_with_both_shapes_updates_both() {
        let band = GelResultRow {
            assay_key: 8,
            refs_key: 1,
            assay_type_key: 2,
            genotype_key: Some(2),
            marker_key: 3,
            structure_key: 12,
            emaps_key: None,
            stage_key: None,
            strength: "Weak".into(),
            age: "postnatal day 21".into(),
            age_min: None,
            age_max: None,
            gel_lane_key: 40,
            sex: None,
            gel_band_key: 7,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: None,
            has_driver: false,
            result_note: None,
        };
        let source = InMemorySource::new("test", vec![insitu(8, 1, 10)], vec![band]);

        let mut reloaded: Vec<CacheRow> = Vec::new();
        crate::reload::full_reload(&source, CacheConfig::default(), &mut reloaded).unwrap();
        assert_eq!(reloaded.len(), 2);

        let mut table = InMemoryCacheTable::default();
        let summary = update_assay(&source, CacheConfig::default(), &mut table, 8).unwrap();
        assert_eq!(summary.shapes, vec![AssayShape::Insitu, AssayShape::Gel]);
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.inserted, 2);

        let rows = table.reader().rows_for_assay(8);
        assert_eq!(rows[0].record.specimen_key, Some(6));
        assert_eq!(rows[1].record.gel_lane_key, Some(40));
        assert_eq!(rows[1].record.structure_key, reloaded[1].record.structure_key);
        assert_eq!(rows[1].record.strength, reloaded[1].record.strength);
        assert_eq!(rows[1].record.has_image, reloaded[1].record.has_image);
    }

    #[test]
    fn non_positive_assay_key_is_rejected() {
        let source = InMemorySource::default();
        let mut table = InMemoryCacheTable::default();
        let err = update_assay(&source, CacheConfig::default(), &mut table, 0).unwrap_err();
        assert!(err.to_string().contains("assay 0"));
    }
}
