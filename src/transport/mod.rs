/// BCP record rendering, parsing, and the bulk record sink.
pub mod bcp;
/// Filesystem helpers: JSON-lines source dumps and output paths.
pub mod fs;
