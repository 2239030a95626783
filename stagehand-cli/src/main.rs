//! Stagehand: declarative object registry and task sequencer.
//!
//! # Usage
//!
//! ```text
//! stagehand [-c stagehand.yaml] [-d DIR] [-p PKGS] [-o OBJS] [-t TASKS] [-f yaml|json|prettyjson] [-v] <command>
//!
//! stagehand show
//! stagehand query '{deploy.Region: {labels: [abc]}}'
//! stagehand context query.yaml deploy_app
//! stagehand run query.yaml deploy_app [--inspect]
//! stagehand dump [--packages]
//! stagehand batch query.yaml deploy_app [--log-dir DIR]
//! ```

mod builtin;
mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::{
    batch::BatchArgs, context::ContextArgs, dump::DumpArgs, query::QueryArgs, run::RunArgs,
    show::ShowArgs,
};
use config::Settings;
use output::OutputFormat;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stagehand",
    version,
    about = "Query declared objects and run task sequences against them",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Document locations and output options shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Project file; defaults to `stagehand.yaml` in the working directory.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory the other document paths are relative to.
    #[arg(short = 'd', long = "dir", global = true)]
    pub dir: Option<PathBuf>,

    /// Package documents (file or directory).
    #[arg(id = "packages_file", value_name = "PACKAGES", short = 'p', long = "packages-file", global = true)]
    pub packages: Option<PathBuf>,

    /// Object documents (file or directory).
    #[arg(id = "objects_file", value_name = "OBJECTS", short = 'o', long = "objects-file", global = true)]
    pub objects: Option<PathBuf>,

    /// Task sequence documents (file or directory).
    #[arg(short = 't', long = "tasks-file", global = true)]
    pub tasks: Option<PathBuf>,

    #[arg(short = 'f', long = "format", global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize loaded kinds, arguments and sequences.
    Show(ShowArgs),

    /// Select objects and print their tags per kind.
    Query(QueryArgs),

    /// Print the context rows a sequence would run over.
    Context(ContextArgs),

    /// Run a task sequence, or list its commands with --inspect.
    Run(RunArgs),

    /// Dump every object, or every package with --packages.
    Dump(DumpArgs),

    /// Run sequences in parallel, one worker and log file each.
    Batch(BatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    stagehand_batch::init_tracing(if cli.global.verbose { "debug" } else { "info" });

    let settings = Settings::resolve(&cli.global)?;
    let format = cli.global.format;
    match cli.command {
        Commands::Show(args) => args.run(&settings, format),
        Commands::Query(args) => args.run(&settings, format),
        Commands::Context(args) => args.run(&settings, format),
        Commands::Run(args) => args.run(&settings, format),
        Commands::Dump(args) => args.run(&settings, format),
        Commands::Batch(args) => args.run(&settings, format),
    }
}
