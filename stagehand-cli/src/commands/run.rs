//! `stagehand run`: expand a sequence and invoke its commands in order.

use std::ops::ControlFlow;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::Settings;
use crate::output::{read_document, OutputFormat};

/// Arguments for `stagehand run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// `{variable: selector}` as inline YAML or a file path.
    pub query: String,

    pub sequence: String,

    /// Print the resolved commands without running them.
    #[arg(short = 'i', long)]
    pub inspect: bool,

    /// Print the sequence's nested structure instead.
    #[arg(long, conflicts_with = "inspect")]
    pub tree: bool,
}

impl RunArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let sequences = settings.load_sequences()?;
        if self.tree {
            return format.print(&sequences.tree(&self.sequence)?);
        }

        let repo = settings.load_repository()?;
        let query = read_document(&self.query)?;
        if self.inspect {
            return format.print(&sequences.resolve(&repo, &query, &self.sequence)?);
        }

        let mut printed: Result<()> = Ok(());
        let summary = sequences
            .run_sequence_with(&repo, &query, &self.sequence, |out| {
                match format.print_item(&out) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(err) => {
                        printed = Err(err);
                        ControlFlow::Break(())
                    }
                }
            })
            .with_context(|| format!("sequence '{}' failed", self.sequence))?;
        printed?;
        tracing::info!(
            sequence = %self.sequence,
            executed = summary.executed,
            total = summary.total,
            "sequence finished"
        );
        Ok(())
    }
}
