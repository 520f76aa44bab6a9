//! Composite-key grouping of result rows into cache equivalence classes.
//!
//! Grouping is a pure, order-preserving partition: every input row lands in
//! exactly one group, groups appear in the order their first row was seen,
//! and rows keep their input order inside each group.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::{RawResultRow, ResultGroup};
use crate::types::{GroupKey, KeyPart};

/// Row column that can take part in a composite grouping key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    AssayKey,
    SpecimenKey,
    GelLaneKey,
    /// In situ result key, or gel band key for gel rows.
    ResultKey,
    StructureKey,
    EmapsKey,
    StageKey,
    GenotypeKey,
}

impl GroupField {
    /// Value of this column on `row`.
    pub fn value(&self, row: &RawResultRow) -> KeyPart {
        match self {
            GroupField::AssayKey => Some(row.assay_key),
            GroupField::SpecimenKey => row.specimen_key,
            GroupField::GelLaneKey => row.gel_lane_key,
            GroupField::ResultKey => Some(row.result_key),
            GroupField::StructureKey => Some(row.structure_key),
            GroupField::EmapsKey => row.emaps_key,
            GroupField::StageKey => row.stage_key,
            GroupField::GenotypeKey => row.genotype_key,
        }
    }
}

/// Composite key of `row` over `fields`, in field order.
pub fn group_key(row: &RawResultRow, fields: &[GroupField]) -> GroupKey {
    fields.iter().map(|field| field.value(row)).collect()
}

/// Partition `rows` by the composite key named by `fields`.
///
/// Repeated identical rows stay as separate entries. Empty input yields an
/// empty map.
pub fn group_rows<I>(rows: I, fields: &[GroupField]) -> IndexMap<GroupKey, ResultGroup>
where
    I: IntoIterator<Item = RawResultRow>,
{
    let mut groups: IndexMap<GroupKey, ResultGroup> = IndexMap::new();
    for row in rows {
        let key = group_key(&row, fields);
        match groups.get_mut(&key) {
            Some(group) => group.push(row),
            None => {
                groups.insert(key, ResultGroup::new(row));
            }
        }
    }
    groups
}
