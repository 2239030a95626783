//! Batch driver: one blocking worker per top-level sequence.
//!
//! Each worker loads its own [`Workspace`] from a shared factory, streams
//! its task outputs as JSON lines to `<log_dir>/<job>/<sequence>.txt` and
//! stops before the next command once the batch is cancelled.

mod error;
pub mod paths;
mod runtime;

pub use error::BatchError;
pub use runtime::{
    expand_targets, init_tracing, run, run_blocking, BatchJob, BatchReport, WorkerReport,
    WorkerStatus, Workspace, WorkspaceFactory, DEFAULT_POLL_INTERVAL,
};
pub use tokio_util::sync::CancellationToken;
