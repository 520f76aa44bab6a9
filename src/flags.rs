//! Summary flags derived from groups of result rows.
//!
//! Every function here is pure and order-independent over its input rows.

use std::collections::HashSet;

use crate::config::RecombinaseRule;
use crate::constants::flags::{
    NOT_EXPRESSED_STRENGTHS, RECOMBINASE_ASSAY_TYPES, RECOMBINASE_REPORTER_GENES,
    REPORTER_ASSAY_TYPE, STRENGTH_LABEL_SEPARATOR,
};
use crate::data::RawResultRow;

/// True when some row carries a strength other than `Absent` / `Not Applicable`.
pub fn compute_expressed(rows: &[RawResultRow]) -> bool {
    rows.iter()
        .any(|row| !NOT_EXPRESSED_STRENGTHS.contains(&row.strength.as_str()))
}

/// Distinct strength labels in first-seen order, joined for display.
pub fn summarize_strengths(rows: &[RawResultRow]) -> String {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for row in rows {
        if seen.insert(row.strength.as_str()) {
            labels.push(row.strength.as_str());
        }
    }
    labels.join(STRENGTH_LABEL_SEPARATOR)
}

/// True unless the group is empty or its assay type only reports recombinase activity.
pub fn compute_is_for_display(rows: &[RawResultRow]) -> bool {
    rows.first()
        .map(|rep| !RECOMBINASE_ASSAY_TYPES.contains(&rep.assay_type_key))
        .unwrap_or(false)
}

/// Recombinase flag under the selected rule.
pub fn compute_is_recombinase(rows: &[RawResultRow], rule: RecombinaseRule) -> bool {
    match rule {
        RecombinaseRule::DriverRelationship => is_recombinase_by_driver(rows),
        RecombinaseRule::ReporterGene => is_recombinase_by_reporter_gene(rows),
    }
}

/// Recombinase assay type, or reporter assay whose allele has a driver relationship.
pub fn is_recombinase_by_driver(rows: &[RawResultRow]) -> bool {
    let Some(rep) = rows.first() else {
        return false;
    };
    is_recombinase_assay_type(rep.assay_type_key)
        || (rep.assay_type_key == REPORTER_ASSAY_TYPE && rep.has_driver)
}

/// Recombinase assay type, or reporter assay whose reporter gene is `Cre` / `FLP`.
pub fn is_recombinase_by_reporter_gene(rows: &[RawResultRow]) -> bool {
    let Some(rep) = rows.first() else {
        return false;
    };
    let reporter_is_driver = rep
        .reporter_gene
        .as_deref()
        .map(|gene| RECOMBINASE_REPORTER_GENES.contains(&gene))
        .unwrap_or(false);
    is_recombinase_assay_type(rep.assay_type_key)
        || (rep.assay_type_key == REPORTER_ASSAY_TYPE && reporter_is_driver)
}

fn is_recombinase_assay_type(assay_type_key: i64) -> bool {
    RECOMBINASE_ASSAY_TYPES.contains(&assay_type_key)
}

/// True when any row has an image pane, an image, and an image width.
///
/// Pass every row of the assay, not just one group's rows.
pub fn compute_has_image<'a, I>(assay_rows: I) -> bool
where
    I: IntoIterator<Item = &'a RawResultRow>,
{
    assay_rows.into_iter().any(row_has_image)
}

fn row_has_image(row: &RawResultRow) -> bool {
    row.image_pane_key.is_some() && row.image_key.is_some() && row.image_xdim.is_some()
}
