/// Database key of a GXD assay (`_assay_key`).
/// Example: `12345`
pub type AssayKey = i64;
/// Database key of a foreign entity copied into the cache (reference, genotype, marker, ...).
/// Example: `1001`
pub type DbKey = i64;
/// Sequential cache identifier (`_expression_key`).
/// Example: `1`, `2`, `3` in assignment order
pub type ExpressionKey = i64;
/// Identifier for the collaborator that produced rows.
/// Examples: `in_memory`, `dump:/data/gxd`
pub type SourceId = String;
/// Controlled-vocabulary strength label.
/// Examples: `Present`, `Absent`, `Not Applicable`, `Very Strong`
pub type StrengthLabel = String;
/// One component of a composite grouping key; `None` for a missing column value.
/// Example: `Some(4821)`
pub type KeyPart = Option<i64>;
/// Composite grouping key, one part per configured key field (a single field is a one-part key).
/// Example: `[Some(4821), Some(37)]`
pub type GroupKey = Vec<KeyPart>;
/// Warning/log message text.
/// Example: `unknown strength label 'Faint' on assay 12`
pub type LogMessage = String;
