use crate::constants::bcp::{
    COLUMN_DELIMITER, LEGACY_COLUMN_DELIMITER, LINE_DELIMITER, RESERVED_DELIMITER_CHARS,
};
use crate::constants::reload::{DEFAULT_BATCH_SIZE, FIRST_EXPRESSION_KEY};
use crate::data::AssayShape;
use crate::errors::CacheError;
use crate::source::utilities::grouping::GroupField;
use crate::types::{AssayKey, ExpressionKey};

/// Rule used to decide whether a reporter (knock in) assay reports recombinase activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecombinaseRule {
    /// The assay's allele has a recombinase driver relationship (`has_driver`).
    #[default]
    DriverRelationship,
    /// The reporter gene is named `Cre` or `FLP`.
    ///
    /// Deprecated: misses driver alleles whose reporter gene is named differently.
    ReporterGene,
}

/// Which path a cache load takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    /// Rebuild the whole cache as a BCP file.
    FullReload,
    /// Replace the cache rows of one assay.
    Incremental(AssayKey),
}

impl CacheMode {
    /// `0` selects a full reload; a positive key updates that assay.
    pub fn from_assay_key(assay_key: AssayKey) -> Result<Self, CacheError> {
        match assay_key {
            0 => Ok(CacheMode::FullReload),
            key if key > 0 => Ok(CacheMode::Incremental(key)),
            key => Err(CacheError::Configuration(format!(
                "assay key must be 0 (full reload) or positive (got {key})"
            ))),
        }
    }
}

/// Output delimiters for BCP records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delimiters {
    /// Separator between fields.
    pub column: String,
    /// Terminator after each record.
    pub line: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            column: COLUMN_DELIMITER.to_string(),
            line: LINE_DELIMITER.to_string(),
        }
    }
}

impl Delimiters {
    /// Tab/newline delimiters written by the legacy scripts.
    pub fn legacy() -> Self {
        Self {
            column: LEGACY_COLUMN_DELIMITER.to_string(),
            line: LINE_DELIMITER.to_string(),
        }
    }

    /// True when a delimiter uses a character that escaped or numeric fields can hold.
    fn uses_reserved_chars(&self) -> bool {
        self.column
            .chars()
            .chain(self.line.chars())
            .any(|ch| ch.is_ascii_alphanumeric() || RESERVED_DELIMITER_CHARS.contains(ch))
    }
}

/// Top-level cache load configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Assays per full-reload batch.
    pub batch_size: AssayKey,
    /// First identifier assigned by a full reload.
    pub first_expression_key: ExpressionKey,
    /// BCP field and record delimiters.
    pub delimiters: Delimiters,
    /// Recombinase rule for reporter assays.
    pub recombinase_rule: RecombinaseRule,
    /// Composite grouping key for in situ rows.
    pub insitu_group_fields: Vec<GroupField>,
    /// Composite grouping key for gel rows.
    pub gel_group_fields: Vec<GroupField>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            first_expression_key: FIRST_EXPRESSION_KEY,
            delimiters: Delimiters::default(),
            recombinase_rule: RecombinaseRule::default(),
            insitu_group_fields: vec![GroupField::ResultKey, GroupField::StructureKey],
            gel_group_fields: vec![GroupField::ResultKey, GroupField::StructureKey],
        }
    }
}

impl CacheConfig {
    /// Override the full-reload batch size.
    pub fn with_batch_size(mut self, batch_size: AssayKey) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the output delimiters.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Select the recombinase rule.
    pub fn with_recombinase_rule(mut self, rule: RecombinaseRule) -> Self {
        self.recombinase_rule = rule;
        self
    }

    /// Override the grouping key for one shape.
    pub fn with_group_fields(mut self, shape: AssayShape, fields: Vec<GroupField>) -> Self {
        match shape {
            AssayShape::Insitu => self.insitu_group_fields = fields,
            AssayShape::Gel => self.gel_group_fields = fields,
        }
        self
    }

    /// Grouping key configured for `shape`.
    pub fn group_fields(&self, shape: AssayShape) -> &[GroupField] {
        match shape {
            AssayShape::Insitu => &self.insitu_group_fields,
            AssayShape::Gel => &self.gel_group_fields,
        }
    }

    /// Reject settings the reload and update paths cannot run with.
    pub fn validated(self) -> Result<Self, CacheError> {
        if self.batch_size <= 0 {
            return Err(CacheError::Configuration(format!(
                "batch size must be positive (got {})",
                self.batch_size
            )));
        }
        if self.insitu_group_fields.is_empty() || self.gel_group_fields.is_empty() {
            return Err(CacheError::Configuration(
                "grouping key needs at least one field".into(),
            ));
        }
        if self.delimiters.column.is_empty() || self.delimiters.line.is_empty() {
            return Err(CacheError::Configuration(
                "BCP delimiters must not be empty".into(),
            ));
        }
        if self.delimiters.column == self.delimiters.line {
            return Err(CacheError::Configuration(
                "field and record delimiters must differ".into(),
            ));
        }
        if self.delimiters.uses_reserved_chars() {
            return Err(CacheError::Configuration(format!(
                "BCP delimiters {:?} / {:?} may not use letters, digits or any of {:?}",
                self.delimiters.column, self.delimiters.line, RESERVED_DELIMITER_CHARS
            )));
        }
        Ok(self)
    }
}
