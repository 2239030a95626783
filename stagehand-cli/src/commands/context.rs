//! `stagehand context`: one `{variable: ref}` row per command group.

use anyhow::Result;
use clap::Args;

use crate::config::Settings;
use crate::output::{read_document, OutputFormat};

/// Arguments for `stagehand context`.
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// `{variable: selector}` as inline YAML or a file path.
    pub query: String,

    pub sequence: String,
}

impl ContextArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let repo = settings.load_repository()?;
        let sequences = settings.load_sequences()?;
        let query = read_document(&self.query)?;
        for row in sequences.resolve_context(&repo, &query, &self.sequence)? {
            format.print_item(&row.to_refs())?;
        }
        Ok(())
    }
}
