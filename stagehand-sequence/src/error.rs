//! Error types for stagehand-sequence.

use thiserror::Error;

use stagehand_core::RepositoryError;

/// All errors that can arise from loading, expanding and running sequences.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The sequence document, or one sequence in it, is malformed.
    #[error("invalid task sequence: {0}")]
    InvalidTaskSequence(String),

    /// No sequence registered under this name.
    #[error("unknown task sequence: {0}")]
    UnknownSequence(String),

    /// No argument set registered under this name.
    #[error("unknown task argument: {0}")]
    UnknownArgument(String),

    /// A query names a variable its argument set does not declare.
    #[error("task sequence arguments \"{arguments}\" do not support variable \"{variable}\"")]
    UnknownVariable { arguments: String, variable: String },

    /// A nested sequence binds Kinds its parent does not.
    #[error("sequence {parent} cannot run {child}: its arguments bind kinds the parent does not")]
    IncompatibleArguments { parent: String, child: String },

    /// A subtask entry is neither `cmd` (`task`) nor `seq`.
    #[error("subtask type must be one of cmd, task, seq; got '{0}'")]
    UnknownSubtaskType(String),

    /// A rendered command string does not parse.
    #[error("invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    /// A command template failed to compile or render.
    #[error("template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// Repository, query or task failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SequenceError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SequenceError::InvalidTaskSequence(msg.into())
    }
}
