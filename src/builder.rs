//! Cache record construction.
//!
//! `build_record` turns one `ResultGroup` into one `CacheRecord`. It never
//! assigns identifiers; the reload and update drivers number records as they
//! emit them.

use std::collections::HashMap;

use crate::config::RecombinaseRule;
use crate::constants::flags::KNOWN_STRENGTHS;
use crate::data::{CacheRecord, RawResultRow, ResultGroup};
use crate::flags::{
    compute_expressed, compute_has_image, compute_is_for_display, compute_is_recombinase,
    summarize_strengths,
};
use crate::types::{AssayKey, LogMessage};
use crate::utils::{age_or_sentinel, escape_note};

/// Assay key -> every row of that assay within the current scope.
///
/// `hasimage` is an assay-level property: an image attached to one specimen
/// or gel lane flags every cache record of the assay.
#[derive(Debug, Default)]
pub struct AssayResultIndex<'a> {
    rows: HashMap<AssayKey, Vec<&'a RawResultRow>>,
}

impl<'a> AssayResultIndex<'a> {
    /// Index every row of every group.
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = &'a ResultGroup>,
    {
        let mut rows: HashMap<AssayKey, Vec<&'a RawResultRow>> = HashMap::new();
        for group in groups {
            for row in group.rows() {
                rows.entry(row.assay_key).or_default().push(row);
            }
        }
        Self { rows }
    }

    /// Rows indexed for `assay_key` (empty when unknown).
    pub fn rows_for(&self, assay_key: AssayKey) -> &[&'a RawResultRow] {
        self.rows
            .get(&assay_key)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    /// Assay-level image flag.
    pub fn has_image(&self, assay_key: AssayKey) -> bool {
        compute_has_image(self.rows_for(assay_key).iter().copied())
    }
}

/// Build the cache record for `group`.
///
/// In full-reload mode missing age bounds become the `-1` sentinel; the
/// incremental path keeps them missing.
pub fn build_record(
    group: &ResultGroup,
    index: &AssayResultIndex<'_>,
    is_full_reload: bool,
    rule: RecombinaseRule,
) -> CacheRecord {
    let rows = group.rows();
    let rep = group.representative();
    let (age_min, age_max) = if is_full_reload {
        (
            Some(age_or_sentinel(rep.age_min)),
            Some(age_or_sentinel(rep.age_max)),
        )
    } else {
        (rep.age_min, rep.age_max)
    };

    CacheRecord {
        assay_key: rep.assay_key,
        refs_key: rep.refs_key,
        assay_type_key: rep.assay_type_key,
        genotype_key: rep.genotype_key,
        marker_key: rep.marker_key,
        structure_key: rep.structure_key,
        emaps_key: rep.emaps_key,
        stage_key: rep.stage_key,
        specimen_key: rep.specimen_key,
        gel_lane_key: rep.gel_lane_key,
        expressed: compute_expressed(rows),
        strength: summarize_strengths(rows),
        age: rep.age.clone(),
        age_min,
        age_max,
        is_recombinase: compute_is_recombinase(rows, rule),
        is_for_gxd: compute_is_for_display(rows),
        has_image: index.has_image(rep.assay_key),
        result_note: rep.result_note.as_deref().map(escape_note),
    }
}

/// Diagnostics for a row whose shape is unexpected but still loadable.
pub fn row_anomalies(row: &RawResultRow) -> Vec<LogMessage> {
    let mut anomalies = Vec::new();
    if !KNOWN_STRENGTHS.contains(&row.strength.as_str()) {
        anomalies.push(format!(
            "unknown strength label '{}' on {} assay {} (result {})",
            row.strength,
            row.shape.as_str(),
            row.assay_key,
            row.result_key
        ));
    }
    if row.genotype_key.is_none() {
        anomalies.push(format!(
            "missing genotype on {} assay {} (result {})",
            row.shape.as_str(),
            row.assay_key,
            row.result_key
        ));
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AssayShape, GelResultRow};
    use crate::source::utilities::grouping::{GroupField, group_rows};

    fn gel_row(gel_band_key: i64, structure_key: i64, strength: &str) -> RawResultRow {
        GelResultRow {
            assay_key: 5,
            refs_key: 50,
            assay_type_key: 2,
            genotype_key: Some(60),
            marker_key: 70,
            structure_key,
            emaps_key: Some(900),
            stage_key: Some(20),
            strength: strength.to_string(),
            age: "postnatal adult".into(),
            age_min: None,
            age_max: None,
            gel_lane_key: 40,
            sex: Some("Female".into()),
            gel_band_key,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: None,
            has_driver: false,
            result_note: Some("Rathke's pouch | faint".into()),
        }
        .into()
    }

    #[test]
    fn build_copies_representative_keys_and_flags() {
        let groups = group_rows(
            vec![gel_row(1, 7, "Absent"), gel_row(1, 7, "Strong")],
            &[GroupField::ResultKey, GroupField::StructureKey],
        );
        let index = AssayResultIndex::from_groups(groups.values());
        let record = build_record(&groups[0], &index, true, RecombinaseRule::default());
        assert_eq!(record.assay_key, 5);
        assert_eq!(record.gel_lane_key, Some(40));
        assert_eq!(record.specimen_key, None);
        assert_eq!(record.emaps_key, Some(900));
        assert!(record.expressed);
        assert_eq!(record.strength, "Absent, Strong");
        assert!(record.is_for_gxd);
        assert!(!record.is_recombinase);
        assert!(!record.has_image);
        assert_eq!(record.result_note.as_deref(), Some("Rathke''s pouch \\| faint"));
    }

    #[test]
    fn age_sentinel_applies_to_full_reload_only() {
        let groups = group_rows(vec![gel_row(1, 7, "Present")], &[GroupField::ResultKey]);
        let index = AssayResultIndex::from_groups(groups.values());
        let full = build_record(&groups[0], &index, true, RecombinaseRule::default());
        assert_eq!(full.age_min, Some(-1.0));
        assert_eq!(full.age_max, Some(-1.0));
        let live = build_record(&groups[0], &index, false, RecombinaseRule::default());
        assert_eq!(live.age_min, None);
        assert_eq!(live.age_max, None);
    }

    #[test]
    fn has_image_comes_from_other_groups_of_the_same_assay() {
        let mut imaged = gel_row(2, 8, "Absent");
        imaged.image_pane_key = Some(3);
        imaged.image_key = Some(4);
        imaged.image_xdim = Some(640);
        let groups = group_rows(
            vec![gel_row(1, 7, "Present"), imaged],
            &[GroupField::ResultKey, GroupField::StructureKey],
        );
        assert_eq!(groups.len(), 2);
        let index = AssayResultIndex::from_groups(groups.values());
        let record = build_record(&groups[0], &index, true, RecombinaseRule::default());
        assert!(record.has_image);
        assert_eq!(index.rows_for(5).len(), 2);
        assert!(index.rows_for(6).is_empty());
    }

    #[test]
    fn anomalies_flag_unknown_strength_and_missing_genotype() {
        let mut row = gel_row(1, 7, "Faint");
        row.genotype_key = None;
        let anomalies = row_anomalies(&row);
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies[0].contains("Faint"));
        assert!(anomalies[1].contains("missing genotype"));
        assert!(row_anomalies(&gel_row(1, 7, "Present")).is_empty());
        assert_eq!(row.shape, AssayShape::Gel);
    }
}
