/// Composite-key grouping of result rows.
pub mod grouping;
