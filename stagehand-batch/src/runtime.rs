use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use stagehand_core::Repository;
use stagehand_sequence::TaskSequences;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{io_err, BatchError};
use crate::paths;

/// A freshly loaded repository plus the sequences to run against it.
pub struct Workspace {
    pub repository: Repository,
    pub sequences: TaskSequences,
}

/// Builds one [`Workspace`] per worker; nothing is shared between workers.
pub type WorkspaceFactory = Arc<dyn Fn() -> Result<Workspace, BatchError> + Send + Sync>;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Job and report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub name: String,
    pub log_dir: PathBuf,
    pub sequences: Vec<String>,
    pub query: Value,
    /// How often the supervisor logs worker status.
    pub poll_interval: Duration,
}

impl BatchJob {
    /// A job named after the current local time.
    pub fn new(log_dir: impl Into<PathBuf>, sequences: Vec<String>, query: Value) -> Self {
        Self {
            name: paths::job_name(&chrono::Local::now()),
            log_dir: log_dir.into(),
            sequences,
            query,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn job_dir(&self) -> PathBuf {
        paths::job_dir(&self.log_dir, &self.name)
    }

    pub fn log_path(&self, sequence: &str) -> PathBuf {
        paths::sequence_log_path(&self.log_dir, &self.name, sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerStatus {
    Succeeded { executed: usize },
    Failed { executed: usize, error: String },
    Cancelled { executed: usize },
}

impl WorkerStatus {
    pub fn executed(&self) -> usize {
        match self {
            Self::Succeeded { executed }
            | Self::Failed { executed, .. }
            | Self::Cancelled { executed } => *executed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub sequence: String,
    pub log_file: PathBuf,
    #[serde(flatten)]
    pub status: WorkerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub job: String,
    pub job_dir: PathBuf,
    /// One entry per worker, in launch order.
    pub workers: Vec<WorkerReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.workers.iter().all(|w| w.status.is_success())
    }

    /// `0` when every worker succeeded, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run `job` on a fresh multi-threaded runtime, blocking the current thread.
/// Ctrl-c cancels every worker.
pub fn run_blocking(job: BatchJob, factory: WorkspaceFactory) -> Result<BatchReport, BatchError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(job, factory, CancellationToken::new()))
}

/// Worker names for `requested`. A single name fans out over that
/// sequence's top-level nested sequences, if it has any.
pub fn expand_targets(
    sequences: &TaskSequences,
    requested: &[String],
) -> Result<Vec<String>, BatchError> {
    match requested {
        [] => Err(BatchError::NoSequences),
        [single] => {
            let sequence = sequences.get_sequence(single)?;
            let nested: Vec<String> = sequence.subsequences().map(str::to_owned).collect();
            if nested.is_empty() {
                return Ok(vec![single.clone()]);
            }
            // Fanning out would drop the parent's own commands.
            if nested.len() != sequence.body().len() {
                return Err(BatchError::MixedBody {
                    name: single.clone(),
                });
            }
            Ok(nested)
        }
        many => {
            for name in many {
                sequences.get_sequence(name)?;
            }
            Ok(many.to_vec())
        }
    }
}

/// Run one worker per target sequence and wait for all of them.
///
/// Workers check `cancel` before each command; the supervisor cancels it on
/// ctrl-c. Worker failures are reported in the [`BatchReport`], not as an
/// `Err`.
pub async fn run(
    job: BatchJob,
    factory: WorkspaceFactory,
    cancel: CancellationToken,
) -> Result<BatchReport, BatchError> {
    let targets = {
        let factory = Arc::clone(&factory);
        let requested = job.sequences.clone();
        let result = tokio::task::spawn_blocking(move || {
            let workspace = factory()?;
            expand_targets(&workspace.sequences, &requested)
        })
        .await;
        handle_join("planner", result)?
    };

    let job_dir = job.job_dir();
    fs::create_dir_all(&job_dir).map_err(|e| io_err(&job_dir, e))?;
    tracing::info!(job = %job.name, workers = targets.len(), dir = %job_dir.display(), "starting batch");

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();
    let query = Arc::new(job.query.clone());
    let mut pending: Vec<(usize, String, JoinHandle<WorkerReport>)> = targets
        .into_iter()
        .enumerate()
        .map(|(index, sequence)| {
            let worker = Worker {
                sequence: sequence.clone(),
                log_file: job.log_path(&sequence),
                query: Arc::clone(&query),
                factory: Arc::clone(&factory),
                cancel: cancel.clone(),
            };
            let done = done_tx.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let report = worker.run();
                let _ = done.send(report.sequence.clone());
                report
            });
            (index, sequence, handle)
        })
        .collect();
    drop(done_tx);

    let signal_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::warn!("received ctrl-c, cancelling batch");
                        cancel.cancel();
                    }
                    Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
                }
            }
        })
    };

    let mut interval = tokio::time::interval(job.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    let mut finished: Vec<(usize, WorkerReport)> = Vec::new();
    let mut stopping = false;
    while !pending.is_empty() {
        tokio::select! {
            _ = interval.tick() => {
                let running: Vec<&str> = pending.iter().map(|(_, s, _)| s.as_str()).collect();
                tracing::info!(job = %job.name, running = ?running, finished = finished.len(), "batch progress");
            }
            _ = cancel.cancelled(), if !stopping => {
                stopping = true;
                for (_, sequence, _) in &pending {
                    tracing::warn!(sequence = %sequence, "stopping");
                }
            }
            Some(sequence) = done_rx.recv() => {
                tracing::debug!(sequence = %sequence, "worker exited");
            }
        }

        let (done, running): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(_, _, h)| h.is_finished());
        pending = running;
        for (index, sequence, handle) in done {
            let log_file = job.log_path(&sequence);
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => WorkerReport {
                    sequence,
                    log_file,
                    status: WorkerStatus::Failed {
                        executed: 0,
                        error: format!("worker panicked: {err}"),
                    },
                },
            };
            log_report(&report);
            finished.push((index, report));
        }
    }

    signal_handle.abort();
    finished.sort_by_key(|(index, _)| *index);
    let report = BatchReport {
        job: job.name,
        job_dir,
        workers: finished.into_iter().map(|(_, r)| r).collect(),
    };
    tracing::info!(job = %report.job, exit_code = report.exit_code(), "batch finished");
    Ok(report)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    sequence: String,
    log_file: PathBuf,
    query: Arc<Value>,
    factory: WorkspaceFactory,
    cancel: CancellationToken,
}

impl Worker {
    fn run(self) -> WorkerReport {
        let mut executed = 0;
        let status = match self.execute(&mut executed) {
            Ok(status) => status,
            Err(err) => {
                append_error(&self.log_file, &err);
                WorkerStatus::Failed {
                    executed,
                    error: err.to_string(),
                }
            }
        };
        WorkerReport {
            sequence: self.sequence,
            log_file: self.log_file,
            status,
        }
    }

    fn execute(&self, executed: &mut usize) -> Result<WorkerStatus, BatchError> {
        if self.cancel.is_cancelled() {
            return Ok(WorkerStatus::Cancelled { executed: 0 });
        }
        tracing::info!(sequence = %self.sequence, log = %self.log_file.display(), "worker started");
        let file = File::create(&self.log_file).map_err(|e| io_err(&self.log_file, e))?;
        let mut writer = BufWriter::new(file);
        let workspace = (self.factory)()?;

        let mut write_failure = None;
        let summary = workspace.sequences.run_sequence_with(
            &workspace.repository,
            &self.query,
            &self.sequence,
            |output| {
                *executed += 1;
                if let Err(err) = write_line(&mut writer, &output) {
                    write_failure = Some(io_err(&self.log_file, err));
                    return ControlFlow::Break(());
                }
                if self.cancel.is_cancelled() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        writer.flush().map_err(|e| io_err(&self.log_file, e))?;
        if let Some(err) = write_failure {
            return Err(err);
        }
        let summary = summary?;
        Ok(if summary.stopped {
            WorkerStatus::Cancelled {
                executed: summary.executed,
            }
        } else {
            WorkerStatus::Succeeded {
                executed: summary.executed,
            }
        })
    }
}

fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")
}

fn append_error(path: &Path, err: &BatchError) {
    let line = json!({"error": err.to_string()});
    let written = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| write_line(&mut file, &line));
    if let Err(io) = written {
        tracing::warn!(path = %path.display(), error = %io, "could not record worker error");
    }
}

fn log_report(report: &WorkerReport) {
    match &report.status {
        WorkerStatus::Succeeded { executed } => {
            tracing::info!(sequence = %report.sequence, executed, "worker succeeded")
        }
        WorkerStatus::Failed { executed, error } => {
            tracing::error!(sequence = %report.sequence, executed, error = %error, "worker failed")
        }
        WorkerStatus::Cancelled { executed } => {
            tracing::warn!(sequence = %report.sequence, executed, "worker cancelled")
        }
    }
}

fn handle_join<T>(
    task: &str,
    result: Result<Result<T, BatchError>, JoinError>,
) -> Result<T, BatchError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(BatchError::Join {
            task: task.to_owned(),
            reason: err.to_string(),
        }),
    }
}

/// Install the stderr `tracing` subscriber; `RUST_LOG` wins over
/// `default_level`.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
