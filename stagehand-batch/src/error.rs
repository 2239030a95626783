use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the batch driver.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sequence error: {0}")]
    Sequence(#[from] stagehand_sequence::SequenceError),

    #[error("repository error: {0}")]
    Repository(#[from] stagehand_core::RepositoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch needs at least one sequence")]
    NoSequences,

    #[error("sequence '{name}' mixes commands with nested sequences; batch it by naming its parts")]
    MixedBody { name: String },

    #[error("{task} task join failure: {reason}")]
    Join { task: String, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BatchError {
    BatchError::Io {
        path: path.into(),
        source,
    }
}
