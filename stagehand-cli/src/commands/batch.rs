//! `stagehand batch`: parallel sequences with a log file each.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use stagehand_batch::{run_blocking, BatchJob, WorkerStatus, WorkspaceFactory};

use crate::config::Settings;
use crate::output::{read_document, OutputFormat};

/// Arguments for `stagehand batch`.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// `{variable: selector}` as inline YAML or a file path.
    pub query: String,

    /// Sequences to run; a single name runs its nested sequences in parallel.
    #[arg(required = true)]
    pub sequences: Vec<String>,

    /// Parent directory of the job's log directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Job name; defaults to a timestamp.
    #[arg(long)]
    pub name: Option<String>,
}

impl BatchArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let paths = settings.workspace_paths()?;
        let log_dir = match self.log_dir {
            Some(dir) => dir,
            None => settings.log_dir()?,
        };
        let query = read_document(&self.query)?;
        let mut job = BatchJob::new(log_dir, self.sequences, query);
        if let Some(name) = self.name {
            job = job.with_name(name);
        }

        let factory: WorkspaceFactory = Arc::new(move || paths.load());
        let report = run_blocking(job, factory).context("batch failed to start")?;

        if format == OutputFormat::Yaml {
            println!("{} {}", "job".bold(), report.job_dir.display());
            for worker in &report.workers {
                let status = match &worker.status {
                    WorkerStatus::Succeeded { .. } => "succeeded".green(),
                    WorkerStatus::Failed { .. } => "failed".red(),
                    WorkerStatus::Cancelled { .. } => "cancelled".yellow(),
                };
                println!(
                    "  {} {} ({} commands) {}",
                    status,
                    worker.sequence,
                    worker.status.executed(),
                    worker.log_file.display().to_string().bright_black()
                );
            }
        } else {
            format.print(&report)?;
        }

        let code = report.exit_code();
        if code != 0 {
            std::process::exit(code);
        }
        Ok(())
    }
}
