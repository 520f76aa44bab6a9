use serde::{Deserialize, Serialize};

pub use crate::types::{AssayKey, DbKey, ExpressionKey, StrengthLabel};

/// Structural shape of an assay's results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssayShape {
    /// Specimen-based results (`GXD_Specimen` / `GXD_InSituResult`).
    Insitu,
    /// Gel-lane-based results (`GXD_GelLane` / `GXD_GelBand`).
    Gel,
}

impl AssayShape {
    /// Both shapes in the order a full reload fetches them.
    pub const ALL: [AssayShape; 2] = [AssayShape::Insitu, AssayShape::Gel];

    /// Short label used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssayShape::Insitu => "insitu",
            AssayShape::Gel => "gel",
        }
    }
}

/// One in situ result row as returned by the specimen query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsituResultRow {
    #[serde(rename = "_assay_key")]
    pub assay_key: AssayKey,
    #[serde(rename = "_refs_key")]
    pub refs_key: DbKey,
    #[serde(rename = "_assaytype_key")]
    pub assay_type_key: i64,
    #[serde(rename = "_genotype_key", default)]
    pub genotype_key: Option<DbKey>,
    #[serde(rename = "_marker_key")]
    pub marker_key: DbKey,
    #[serde(rename = "_structure_key")]
    pub structure_key: DbKey,
    #[serde(rename = "_emaps_key", default)]
    pub emaps_key: Option<DbKey>,
    #[serde(rename = "_stage_key", default)]
    pub stage_key: Option<DbKey>,
    pub strength: StrengthLabel,
    #[serde(default)]
    pub age: String,
    #[serde(rename = "agemin", default)]
    pub age_min: Option<f64>,
    #[serde(rename = "agemax", default)]
    pub age_max: Option<f64>,
    #[serde(rename = "_specimen_key")]
    pub specimen_key: DbKey,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(rename = "_result_key")]
    pub result_key: DbKey,
    #[serde(rename = "_imagepane_key", default)]
    pub image_pane_key: Option<DbKey>,
    #[serde(rename = "_image_key", default)]
    pub image_key: Option<DbKey>,
    #[serde(default)]
    pub image_xdim: Option<i64>,
    #[serde(rename = "reportergene", default)]
    pub reporter_gene: Option<String>,
    #[serde(rename = "hasdriver", default)]
    pub has_driver: bool,
    #[serde(rename = "resultnote", default)]
    pub result_note: Option<String>,
}

/// One gel band row as returned by the gel-lane query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GelResultRow {
    #[serde(rename = "_assay_key")]
    pub assay_key: AssayKey,
    #[serde(rename = "_refs_key")]
    pub refs_key: DbKey,
    #[serde(rename = "_assaytype_key")]
    pub assay_type_key: i64,
    #[serde(rename = "_genotype_key", default)]
    pub genotype_key: Option<DbKey>,
    #[serde(rename = "_marker_key")]
    pub marker_key: DbKey,
    #[serde(rename = "_structure_key")]
    pub structure_key: DbKey,
    #[serde(rename = "_emaps_key", default)]
    pub emaps_key: Option<DbKey>,
    #[serde(rename = "_stage_key", default)]
    pub stage_key: Option<DbKey>,
    pub strength: StrengthLabel,
    #[serde(default)]
    pub age: String,
    #[serde(rename = "agemin", default)]
    pub age_min: Option<f64>,
    #[serde(rename = "agemax", default)]
    pub age_max: Option<f64>,
    #[serde(rename = "_gellane_key")]
    pub gel_lane_key: DbKey,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(rename = "_gelband_key")]
    pub gel_band_key: DbKey,
    #[serde(rename = "_imagepane_key", default)]
    pub image_pane_key: Option<DbKey>,
    #[serde(rename = "_image_key", default)]
    pub image_key: Option<DbKey>,
    #[serde(default)]
    pub image_xdim: Option<i64>,
    #[serde(rename = "reportergene", default)]
    pub reporter_gene: Option<String>,
    #[serde(rename = "hasdriver", default)]
    pub has_driver: bool,
    #[serde(rename = "resultnote", default)]
    pub result_note: Option<String>,
}

/// Shape-independent result row consumed by grouping and flag derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawResultRow {
    pub shape: AssayShape,
    pub assay_key: AssayKey,
    pub refs_key: DbKey,
    pub assay_type_key: i64,
    pub genotype_key: Option<DbKey>,
    pub marker_key: DbKey,
    pub structure_key: DbKey,
    pub emaps_key: Option<DbKey>,
    pub stage_key: Option<DbKey>,
    /// Specimen key (in situ rows only).
    pub specimen_key: Option<DbKey>,
    /// Gel lane key (gel rows only).
    pub gel_lane_key: Option<DbKey>,
    /// In situ result key, or gel band key for gel rows.
    pub result_key: DbKey,
    pub strength: StrengthLabel,
    pub age: String,
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    pub sex: Option<String>,
    pub image_pane_key: Option<DbKey>,
    pub image_key: Option<DbKey>,
    pub image_xdim: Option<i64>,
    pub reporter_gene: Option<String>,
    /// True when the assay's allele has a recombinase driver relationship.
    pub has_driver: bool,
    pub result_note: Option<String>,
}

impl From<InsituResultRow> for RawResultRow {
    fn from(row: InsituResultRow) -> Self {
        Self {
            shape: AssayShape::Insitu,
            assay_key: row.assay_key,
            refs_key: row.refs_key,
            assay_type_key: row.assay_type_key,
            genotype_key: row.genotype_key,
            marker_key: row.marker_key,
            structure_key: row.structure_key,
            emaps_key: row.emaps_key,
            stage_key: row.stage_key,
            specimen_key: Some(row.specimen_key),
            gel_lane_key: None,
            result_key: row.result_key,
            strength: row.strength,
            age: row.age,
            age_min: row.age_min,
            age_max: row.age_max,
            sex: row.sex,
            image_pane_key: row.image_pane_key,
            image_key: row.image_key,
            image_xdim: row.image_xdim,
            reporter_gene: row.reporter_gene,
            has_driver: row.has_driver,
            result_note: row.result_note,
        }
    }
}

impl From<GelResultRow> for RawResultRow {
    fn from(row: GelResultRow) -> Self {
        Self {
            shape: AssayShape::Gel,
            assay_key: row.assay_key,
            refs_key: row.refs_key,
            assay_type_key: row.assay_type_key,
            genotype_key: row.genotype_key,
            marker_key: row.marker_key,
            structure_key: row.structure_key,
            emaps_key: row.emaps_key,
            stage_key: row.stage_key,
            specimen_key: None,
            gel_lane_key: Some(row.gel_lane_key),
            result_key: row.gel_band_key,
            strength: row.strength,
            age: row.age,
            age_min: row.age_min,
            age_max: row.age_max,
            sex: row.sex,
            image_pane_key: row.image_pane_key,
            image_key: row.image_key,
            image_xdim: row.image_xdim,
            reporter_gene: row.reporter_gene,
            has_driver: row.has_driver,
            result_note: row.result_note,
        }
    }
}

/// Ordered, non-empty rows that share one composite grouping key.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultGroup {
    rows: Vec<RawResultRow>,
}

impl ResultGroup {
    /// Start a group from its first row.
    pub fn new(first: RawResultRow) -> Self {
        Self { rows: vec![first] }
    }

    /// Append a row sharing this group's key.
    pub fn push(&mut self, row: RawResultRow) {
        self.rows.push(row);
    }

    /// The row whose foreign keys represent the group (its first row).
    pub fn representative(&self) -> &RawResultRow {
        &self.rows[0]
    }

    /// Rows in first-seen order.
    pub fn rows(&self) -> &[RawResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<RawResultRow> {
        self.rows
    }
}

/// Cache record built from one group, before identifier assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub assay_key: AssayKey,
    pub refs_key: DbKey,
    pub assay_type_key: i64,
    pub genotype_key: Option<DbKey>,
    pub marker_key: DbKey,
    pub structure_key: DbKey,
    pub emaps_key: Option<DbKey>,
    pub stage_key: Option<DbKey>,
    pub specimen_key: Option<DbKey>,
    pub gel_lane_key: Option<DbKey>,
    pub expressed: bool,
    /// Distinct strength labels observed in the group, joined for display.
    pub strength: String,
    pub age: String,
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    pub is_recombinase: bool,
    pub is_for_gxd: bool,
    pub has_image: bool,
    /// Escaped result note of the representative row.
    pub result_note: Option<String>,
}

/// A cache record with its assigned `_expression_key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRow {
    pub expression_key: ExpressionKey,
    pub record: CacheRecord,
}

impl CacheRow {
    pub fn new(expression_key: ExpressionKey, record: CacheRecord) -> Self {
        Self {
            expression_key,
            record,
        }
    }
}
