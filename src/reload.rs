//! Full reload: rebuild every cache row, batch by batch, into a bulk sink.
//!
//! Batches are contiguous half-open assay key ranges starting at 0. Each
//! batch is fetched, grouped, built, and emitted before the next one starts;
//! identifiers keep counting across batches.

use std::ops::Range;

use tracing::{debug, info, warn};

use crate::builder::{AssayResultIndex, build_record, row_anomalies};
use crate::config::CacheConfig;
use crate::data::{AssayShape, CacheRow, ResultGroup};
use crate::errors::CacheError;
use crate::metrics::{BatchStats, ReloadSummary};
use crate::source::utilities::grouping::group_rows;
use crate::source::{FetchScope, ResultSource, ensure_in_scope};
use crate::transport::bcp::RecordSink;
use crate::types::{AssayKey, ExpressionKey};

/// Where a full reload currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadPhase {
    Init,
    FetchBatch,
    Group,
    Build,
    Emit,
    Done,
}

/// Half-open batch ranges covering `0..=max_key`.
///
/// A range that would run past `AssayKey::MAX` ends there instead and is the last one.
pub fn batch_ranges(max_key: AssayKey, batch_size: AssayKey) -> Vec<Range<AssayKey>> {
    let mut ranges = Vec::new();
    if batch_size <= 0 {
        return ranges;
    }
    let mut start: AssayKey = 0;
    while start <= max_key {
        match start.checked_add(batch_size) {
            Some(end) => {
                ranges.push(start..end);
                start = end;
            }
            None => {
                ranges.push(start..AssayKey::MAX);
                break;
            }
        }
    }
    ranges
}

/// Drives a full reload from a `ResultSource` into a `RecordSink`.
pub struct BatchCoordinator<'a, S: ResultSource + ?Sized> {
    source: &'a S,
    config: CacheConfig,
    phase: ReloadPhase,
    next_key: ExpressionKey,
}

impl<'a, S: ResultSource + ?Sized> BatchCoordinator<'a, S> {
    /// Validate `config` and prepare a coordinator over `source`.
    pub fn new(source: &'a S, config: CacheConfig) -> Result<Self, CacheError> {
        let config = config.validated()?;
        let next_key = config.first_expression_key;
        Ok(Self {
            source,
            config,
            phase: ReloadPhase::Init,
            next_key,
        })
    }

    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    /// Run every batch, emitting rows to `sink` in identifier order.
    ///
    /// Stops at the first failure; the error names the batch range. Output
    /// already handed to `sink` is then incomplete and must be discarded.
    pub fn run<K: RecordSink + ?Sized>(
        &mut self,
        sink: &mut K,
    ) -> Result<ReloadSummary, CacheError> {
        self.phase = ReloadPhase::Init;
        let max_assay_key = self.source.max_assay_key()?;
        let ranges = match max_assay_key {
            Some(max_key) => batch_ranges(max_key, self.config.batch_size),
            None => Vec::new(),
        };
        info!(
            "[gxd:reload] source='{}' max_assay_key={:?} batches={} batch_size={}",
            self.source.id(),
            max_assay_key,
            ranges.len(),
            self.config.batch_size
        );

        let mut summary = ReloadSummary {
            max_assay_key,
            ..ReloadSummary::default()
        };
        for range in ranges {
            let (start, end) = (range.start, range.end);
            let first_in_batch = self.next_key;
            let stats = self
                .run_batch(range, sink)
                .map_err(|err| err.in_batch(start, end))?;
            if stats.records > 0 {
                if summary.first_key.is_none() {
                    summary.first_key = Some(first_in_batch);
                }
                summary.last_key = Some(self.next_key - 1);
            }
            info!(
                "[gxd:reload] batch [{}, {}) insitu_rows={} gel_rows={} groups={} records={}",
                stats.start,
                stats.end,
                stats.insitu_rows,
                stats.gel_rows,
                stats.groups,
                stats.records
            );
            summary.batches.push(stats);
        }
        sink.finish()?;
        self.phase = ReloadPhase::Done;
        info!(
            "[gxd:reload] done: records={} anomalies={} keys={:?}..={:?}",
            summary.records(),
            summary.anomalies(),
            summary.first_key,
            summary.last_key
        );
        Ok(summary)
    }

    fn run_batch<K: RecordSink + ?Sized>(
        &mut self,
        range: Range<AssayKey>,
        sink: &mut K,
    ) -> Result<BatchStats, CacheError> {
        let mut stats = BatchStats {
            start: range.start,
            end: range.end,
            ..BatchStats::default()
        };
        let scope = FetchScope::Range(range);

        self.set_phase(ReloadPhase::FetchBatch);
        let insitu = self.source.fetch(AssayShape::Insitu, &scope)?;
        let gel = self.source.fetch(AssayShape::Gel, &scope)?;
        ensure_in_scope(self.source.id(), &scope, &insitu)?;
        ensure_in_scope(self.source.id(), &scope, &gel)?;
        stats.insitu_rows = insitu.len();
        stats.gel_rows = gel.len();

        self.set_phase(ReloadPhase::Group);
        let insitu_groups = group_rows(insitu, self.config.group_fields(AssayShape::Insitu));
        let gel_groups = group_rows(gel, self.config.group_fields(AssayShape::Gel));
        let groups: Vec<ResultGroup> = insitu_groups
            .into_values()
            .chain(gel_groups.into_values())
            .collect();
        stats.groups = groups.len();
        for row in groups.iter().flat_map(|group| group.rows()) {
            let anomalies = row_anomalies(row);
            if !anomalies.is_empty() {
                stats.anomalies += 1;
            }
            for message in anomalies {
                warn!("[gxd:reload] {}", message);
            }
        }

        self.set_phase(ReloadPhase::Build);
        let index = AssayResultIndex::from_groups(groups.iter());
        let rule = self.config.recombinase_rule;
        let records: Vec<_> = groups
            .iter()
            .map(|group| build_record(group, &index, true, rule))
            .collect();

        self.set_phase(ReloadPhase::Emit);
        for record in records {
            sink.emit(&CacheRow::new(self.next_key, record))?;
            self.next_key += 1;
            stats.records += 1;
        }
        Ok(stats)
    }

    fn set_phase(&mut self, phase: ReloadPhase) {
        debug!("[gxd:reload] phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

/// Run a full reload of `source` into `sink` with `config`.
pub fn full_reload<S, K>(
    source: &S,
    config: CacheConfig,
    sink: &mut K,
) -> Result<ReloadSummary, CacheError>
where
    S: ResultSource + ?Sized,
    K: RecordSink + ?Sized,
{
    BatchCoordinator::new(source, config)?.run(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GelResultRow, InsituResultRow, RawResultRow};
    use crate::source::InMemorySource;

    fn insitu(
        assay_key: AssayKey,
        result_key: i64,
        structure_key: i64,
        strength: &str,
    ) -> InsituResultRow {
        InsituResultRow {
            assay_key,
            refs_key: 100,
            assay_type_key: 1,
            genotype_key: Some(200),
            marker_key: 300,
            structure_key,
            emaps_key: None,
            stage_key: Some(15),
            strength: strength.into(),
            age: "embryonic day 10.5".into(),
            age_min: Some(10.5),
            age_max: None,
            specimen_key: assay_key * 10,
            sex: None,
            result_key,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: None,
            has_driver: false,
            result_note: None,
        }
    }

    fn gel(assay_key: AssayKey, gel_band_key: i64, structure_key: i64) -> GelResultRow {
        GelResultRow {
            assay_key,
            refs_key: 100,
            assay_type_key: 2,
            genotype_key: Some(200),
            marker_key: 300,
            structure_key,
            emaps_key: None,
            stage_key: None,
            strength: "Strong".into(),
            age: "postnatal".into(),
            age_min: None,
            age_max: None,
            gel_lane_key: assay_key * 10,
            sex: None,
            gel_band_key,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: None,
            has_driver: false,
            result_note: None,
        }
    }

    struct FailingSource {
        inner: InMemorySource,
        fail_from: AssayKey,
    }

    impl ResultSource for FailingSource {
        fn id(&self) -> &str {
            "failing"
        }

        fn max_assay_key(&self) -> Result<Option<AssayKey>, CacheError> {
            self.inner.max_assay_key()
        }

        fn assay_shapes(&self, assay_key: AssayKey) -> Result<Vec<AssayShape>, CacheError> {
            self.inner.assay_shapes(assay_key)
        }

        fn fetch(
            &self,
            shape: AssayShape,
            scope: &FetchScope,
        ) -> Result<Vec<RawResultRow>, CacheError> {
            match scope {
                FetchScope::Range(range) if range.start >= self.fail_from => {
                    Err(CacheError::SourceUnavailable {
                        source_id: "failing".into(),
                        reason: "connection reset".into(),
                    })
                }
                _ => self.inner.fetch(shape, scope),
            }
        }
    }

    #[test]
    fn batch_ranges_cover_max_key() {
        assert_eq!(batch_ranges(0, 1000), vec![0..1000]);
        assert_eq!(batch_ranges(999, 1000), vec![0..1000]);
        assert_eq!(batch_ranges(1000, 1000), vec![0..1000, 1000..2000]);
        assert_eq!(batch_ranges(5, 2), vec![0..2, 2..4, 4..6]);
        assert!(batch_ranges(5, 0).is_empty());
    }

    #[test]
    fn batch_ranges_stop_at_the_largest_key() {
        let half = AssayKey::MAX / 2;
        assert_eq!(
            batch_ranges(AssayKey::MAX - 1, half),
            vec![0..half, half..2 * half, 2 * half..AssayKey::MAX]
        );
        assert_eq!(batch_ranges(AssayKey::MAX - 1, AssayKey::MAX), vec![0..AssayKey::MAX]);
    }

    #[test]
    fn rows_outside_the_batch_abort_the_reload() {
        struct LeakySource(InMemorySource);

        impl ResultSource for LeakySource {
            fn id(&self) -> &str {
                "leaky"
            }

            fn max_assay_key(&self) -> Result<Option<AssayKey>, CacheError> {
                self.0.max_assay_key()
            }

            fn assay_shapes(&self, assay_key: AssayKey) -> Result<Vec<AssayShape>, CacheError> {
                self.0.assay_shapes(assay_key)
            }

            fn fetch(
                &self,
                shape: AssayShape,
                _scope: &FetchScope,
            ) -> Result<Vec<RawResultRow>, CacheError> {
                self.0.fetch(shape, &FetchScope::All)
            }
        }

        let source = LeakySource(InMemorySource::new(
            "test",
            vec![insitu(1, 10, 5, "Present"), insitu(12, 120, 5, "Present")],
            Vec::new(),
        ));
        let mut rows: Vec<CacheRow> = Vec::new();
        let err = full_reload(&source, CacheConfig::default().with_batch_size(10), &mut rows)
            .unwrap_err();
        match err {
            CacheError::Batch { start: 0, end: 10, source } => {
                assert!(matches!(*source, CacheError::SourceInconsistent { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(rows.is_empty());
    }

    #[test]
    fn insitu_groups_precede_gel_groups_within_a_batch() {
        let source = InMemorySource::new(
            "test",
            vec![insitu(3, 30, 7, "Absent"), insitu(3, 30, 7, "Weak")],
            vec![gel(1, 11, 7)],
        );
        let mut rows: Vec<CacheRow> = Vec::new();
        let summary = full_reload(&source, CacheConfig::default(), &mut rows).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.assay_key, 3);
        assert_eq!(rows[0].record.strength, "Absent, Weak");
        assert!(rows[0].record.expressed);
        assert_eq!(rows[0].record.age_max, Some(-1.0));
        assert_eq!(rows[1].record.assay_key, 1);
        assert_eq!(rows[1].record.gel_lane_key, Some(10));
        assert_eq!(summary.first_key, Some(1));
        assert_eq!(summary.last_key, Some(2));
        assert_eq!(summary.batches.len(), 1);
    }

    #[test]
    fn keys_continue_across_batches() {
        let source = InMemorySource::new(
            "test",
            vec![insitu(1, 10, 5, "Present"), insitu(4, 40, 5, "Present")],
            vec![gel(7, 70, 5)],
        );
        let config = CacheConfig::default().with_batch_size(3);
        let mut coordinator = BatchCoordinator::new(&source, config).unwrap();
        assert_eq!(coordinator.phase(), ReloadPhase::Init);
        let mut rows: Vec<CacheRow> = Vec::new();
        let summary = coordinator.run(&mut rows).unwrap();
        assert_eq!(coordinator.phase(), ReloadPhase::Done);
        let keys: Vec<ExpressionKey> = rows.iter().map(|row| row.expression_key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(summary.batches.len(), 3);
        assert_eq!(summary.records(), 3);
    }

    #[test]
    fn empty_source_emits_nothing() {
        let source = InMemorySource::default();
        let mut rows: Vec<CacheRow> = Vec::new();
        let summary = full_reload(&source, CacheConfig::default(), &mut rows).unwrap();
        assert!(rows.is_empty());
        assert!(summary.batches.is_empty());
        assert_eq!(summary.first_key, None);
    }

    #[test]
    fn failure_names_the_batch_range() {
        let source = FailingSource {
            inner: InMemorySource::new(
                "test",
                vec![insitu(1, 10, 5, "Present"), insitu(12, 120, 5, "Present")],
                Vec::new(),
            ),
            fail_from: 10,
        };
        let mut rows: Vec<CacheRow> = Vec::new();
        let err = full_reload(&source, CacheConfig::default().with_batch_size(10), &mut rows)
            .unwrap_err();
        assert!(matches!(err, CacheError::Batch { start: 10, end: 20, .. }));
        assert!(err.to_string().contains("[10, 20)"));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let source = InMemorySource::default();
        let result = BatchCoordinator::new(&source, CacheConfig::default().with_batch_size(-1));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn anomalies_are_counted_not_fatal() {
        let mut odd = insitu(2, 20, 5, "Faint");
        odd.genotype_key = None;
        let source =
            InMemorySource::new("test", vec![odd, insitu(2, 21, 5, "Present")], Vec::new());
        let mut rows: Vec<CacheRow> = Vec::new();
        let summary = full_reload(&source, CacheConfig::default(), &mut rows).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(summary.anomalies(), 1);
    }
}
