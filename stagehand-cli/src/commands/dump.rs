//! `stagehand dump`: objects or packages as loadable documents.

use anyhow::Result;
use clap::Args;

use crate::config::Settings;
use crate::output::OutputFormat;

/// Arguments for `stagehand dump`.
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Dump package documents instead of objects.
    #[arg(long)]
    pub packages: bool,
}

impl DumpArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let repo = settings.load_repository()?;
        let items = if self.packages {
            repo.dump_packages()?
        } else {
            repo.dump()?
        };
        for item in &items {
            format.print_item(item)?;
        }
        Ok(())
    }
}
