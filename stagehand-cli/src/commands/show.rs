//! `stagehand show`: what the loaded documents declare.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use stagehand_core::Repository;
use stagehand_sequence::TaskSequences;

use crate::config::Settings;
use crate::output::OutputFormat;

/// Arguments for `stagehand show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Print plain tables even when a JSON format is selected.
    #[arg(long)]
    pub table: bool,
}

impl ShowArgs {
    pub fn run(self, settings: &Settings, format: OutputFormat) -> Result<()> {
        let repo = settings.load_repository()?;
        let sequences = match settings.tasks {
            Some(_) => Some(settings.load_sequences()?),
            None => None,
        };
        let summary = Summary::collect(&repo, sequences.as_ref());
        if format == OutputFormat::Yaml || self.table {
            print_tables(summary);
            return Ok(());
        }
        format.print(&summary)
    }
}

#[derive(Debug, Serialize, Tabled)]
struct KindRow {
    kind: String,
    implementation: String,
    tasks: String,
    objects: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct ArgumentRow {
    arguments: String,
    variables: String,
}

#[derive(Debug, Serialize, Tabled)]
struct SequenceRow {
    sequence: String,
    arguments: String,
    nested: String,
}

#[derive(Debug, Serialize)]
struct Summary {
    kinds: Vec<KindRow>,
    arguments: Vec<ArgumentRow>,
    sequences: Vec<SequenceRow>,
}

impl Summary {
    fn collect(repo: &Repository, sequences: Option<&TaskSequences>) -> Self {
        let kinds = repo
            .kinds()
            .map(|kind| KindRow {
                kind: kind.name().to_owned(),
                implementation: kind.implementation_path().to_owned(),
                tasks: kind.tasks().names().collect::<Vec<_>>().join(", "),
                objects: repo.get_objects(kind.name()).map_or(0, |objs| objs.len()),
            })
            .collect();
        let Some(sequences) = sequences else {
            return Self {
                kinds,
                arguments: Vec::new(),
                sequences: Vec::new(),
            };
        };
        let arguments = sequences
            .arguments()
            .map(|args| ArgumentRow {
                arguments: args.name().to_owned(),
                variables: args
                    .variables()
                    .map(|(var, kind)| format!("{var}: {kind}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        let sequences = sequences
            .sequences()
            .map(|seq| SequenceRow {
                sequence: seq.name().to_owned(),
                arguments: seq.arguments().to_owned(),
                nested: seq.subsequences().collect::<Vec<_>>().join(", "),
            })
            .collect();
        Self {
            kinds,
            arguments,
            sequences,
        }
    }
}

fn print_tables(summary: Summary) {
    println!(
        "Stagehand v{} | {} kinds | {} objects | {} sequences",
        env!("CARGO_PKG_VERSION"),
        summary.kinds.len(),
        summary.kinds.iter().map(|k| k.objects).sum::<usize>(),
        summary.sequences.len(),
    );
    print_section("KINDS", summary.kinds);
    print_section("ARGUMENTS", summary.arguments);
    print_section("SEQUENCES", summary.sequences);
}

fn print_section<T: Tabled>(title: &str, rows: Vec<T>) {
    if rows.is_empty() {
        return;
    }
    println!("{}", title.bold());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
