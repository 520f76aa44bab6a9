#![doc = include_str!("../README.md")]

/// CLI runner behind the `gxdexpression` binary.
pub mod app;
/// Cache record construction from result groups.
pub mod builder;
/// Load configuration, delimiters, and mode selection.
pub mod config;
/// Centralized constants used across flags, builder, reload, and BCP output.
pub mod constants;
/// Source row, result group, and cache record types.
pub mod data;
/// Flag derivation over result groups.
pub mod flags;
/// Reload and update summaries.
pub mod metrics;
/// Full reload batch coordinator.
pub mod reload;
/// Result source traits and built-in sources.
pub mod source;
/// Cache table collaborators for incremental updates.
pub mod store;
/// Output and input transports (BCP records, filesystem dumps).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Single-assay incremental updates.
pub mod update;
/// Note escaping and age helpers.
pub mod utils;

mod errors;

pub use builder::{AssayResultIndex, build_record};
pub use config::{CacheConfig, CacheMode, Delimiters, RecombinaseRule};
pub use data::{
    AssayShape, CacheRecord, CacheRow, GelResultRow, InsituResultRow, RawResultRow, ResultGroup,
};
pub use errors::CacheError;
pub use metrics::{BatchStats, ReloadSummary, UpdateSummary};
pub use reload::{BatchCoordinator, ReloadPhase, full_reload};
pub use source::utilities::grouping::{GroupField, group_rows};
pub use source::{FetchScope, InMemorySource, ResultSource};
pub use store::{BcpCacheTable, CacheTable, CacheTableReader, InMemoryCacheTable, SqlScriptTable};
pub use transport::bcp::{BcpWriter, RecordSink};
pub use types::{AssayKey, DbKey, ExpressionKey, GroupKey, LogMessage, SourceId, StrengthLabel};
pub use update::{IncrementalUpdater, update_assay};
