use std::io;

use thiserror::Error;

use crate::types::{AssayKey, SourceId};

/// Error type for source, sink, configuration, and persistence failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("result source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },
    #[error("result source '{source_id}' returned inconsistent state: {details}")]
    SourceInconsistent {
        source_id: SourceId,
        details: String,
    },
    #[error("full reload aborted in assay batch [{start}, {end}): {source}")]
    Batch {
        start: AssayKey,
        end: AssayKey,
        #[source]
        source: Box<CacheError>,
    },
    #[error("cache update for assay {assay_key} aborted: {source}")]
    Update {
        assay_key: AssayKey,
        #[source]
        source: Box<CacheError>,
    },
    #[error("cache sink failure: {0}")]
    Sink(String),
    #[error("line {line}: {details}")]
    Parse { line: usize, details: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Wrap a failure with the assay batch range it happened in.
    pub fn in_batch(self, start: AssayKey, end: AssayKey) -> Self {
        CacheError::Batch {
            start,
            end,
            source: Box::new(self),
        }
    }

    /// Wrap a failure with the assay being updated.
    pub fn in_update(self, assay_key: AssayKey) -> Self {
        CacheError::Update {
            assay_key,
            source: Box::new(self),
        }
    }
}
