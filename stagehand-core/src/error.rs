//! Error types for stagehand-core.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by a task handler.
pub type TaskFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can arise from schema, object-store and task operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    // -- schema ---------------------------------------------------------------
    /// No Kind registered under this qualified name.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// No Package registered under this name.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// A field is declared both as an attribute and as a relation.
    #[error("kind {kind} declares '{name}' as both an attribute and a relation")]
    DuplicateField { kind: String, name: String },

    /// An attribute or relation spec string could not be parsed.
    #[error("invalid spec for {kind}.{name}: '{spec}' ({reason})")]
    InvalidAttributeSpec {
        kind: String,
        name: String,
        spec: String,
        reason: String,
    },

    /// A Kind or Package declaration is malformed.
    #[error("invalid kind: {0}")]
    InvalidKind(String),

    /// The implementation path named by a Kind was never registered.
    #[error("kind {kind} names unregistered implementation '{path}'")]
    UnknownImplementation { kind: String, path: String },

    /// Packages were added but `validate_packages` has not succeeded since.
    #[error("packages must be validated before objects are added")]
    PackagesNotValidated,

    // -- objects --------------------------------------------------------------
    /// An object with the same `(kind, tag)` already exists.
    #[error("duplicate object: {0}")]
    DuplicateObject(String),

    /// No object with this tag exists in the Kind.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// The Kind declares no attribute or relation with this name.
    #[error("unknown field {name} for kind {kind}")]
    UnknownField { kind: String, name: String },

    /// A raw object document is not a mapping or lacks `kind`/`tag`.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A `kind/tag` reference string is malformed.
    #[error("invalid object reference: '{0}'")]
    InvalidReference(String),

    /// A required attribute or relation field is absent.
    #[error("required attribute not found: {kind}.{name}")]
    AttributeMissing { kind: String, name: String },

    /// A field value does not fit its declared type.
    #[error("invalid attribute type for {kind}.{name}: expected {expected}, found {found}")]
    AttributeTypeMismatch {
        kind: String,
        name: String,
        expected: String,
        found: String,
    },

    /// A relation was accessed as required but resolved to nothing.
    #[error("required relation was not found: {obj}.{name}")]
    RelationMissing { obj: String, name: String },

    // -- tasks ----------------------------------------------------------------
    /// The Kind does not declare (or cannot bind) this task.
    #[error("task not found: {kind}.{task}")]
    UnknownTask { kind: String, task: String },

    /// A `pkg.Kind.task` reference string is malformed.
    #[error("invalid task reference: '{0}'")]
    InvalidTaskReference(String),

    /// Task arguments are neither a bare name nor a single-key mapping.
    #[error("invalid task invocation: {0}")]
    InvalidTaskInvocation(String),

    /// The task handler itself returned an error.
    #[error("task {task} failed on {obj}: {source}")]
    TaskFailed {
        task: String,
        obj: String,
        #[source]
        source: TaskFailure,
    },

    // -- queries --------------------------------------------------------------
    /// A query document or selector is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // -- documents ------------------------------------------------------------
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document path is neither a file nor a directory.
    #[error("not a file or directory: {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load, with the file it came from.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A document parsed but does not have the expected shape.
    #[error("invalid document: {0}")]
    Document(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RepositoryError {
    RepositoryError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_item() {
        let err = RepositoryError::DuplicateObject("deploy.Region/abc1".into());
        assert_eq!(err.to_string(), "duplicate object: deploy.Region/abc1");

        let err = RepositoryError::AttributeMissing {
            kind: "test.Region".into(),
            name: "url".into(),
        };
        assert!(err.to_string().contains("test.Region.url"));
    }

    #[test]
    fn task_failure_keeps_source() {
        let source: TaskFailure = "boom".into();
        let err = RepositoryError::TaskFailed {
            task: "deploy.Region.login".into(),
            obj: "deploy.Region/abc1".into(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().ends_with("boom"));
    }
}
