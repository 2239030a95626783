//! `stagehand query`: tags of the objects a selector document matches.

use anyhow::{Context, Result};
use clap::Args;

use stagehand_core::{Query, QueryShape};

use crate::config::Settings;
use crate::output::{read_document, OutputFormat};

/// Arguments for `stagehand query`.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// `{kind: selector}` as inline YAML or a file path.
    pub selector: String,

    /// Print whole objects instead of tags.
    #[arg(long)]
    pub objects: bool,
}

impl QueryArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let repo = settings.load_repository()?;
        let query = Query::parse(&read_document(&self.selector)?)
            .with_context(|| format!("invalid selector {}", self.selector))?;
        let result = repo.query(&query)?;
        let shape = if self.objects {
            QueryShape::Objects
        } else {
            QueryShape::Tags
        };
        format.print(&result.to_value(shape))
    }
}
