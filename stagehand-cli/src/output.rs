//! Rendering command results as YAML or JSON on stdout.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
    Prettyjson,
}

impl OutputFormat {
    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        let text = match self {
            Self::Yaml => serde_yaml::to_string(value).context("failed to render YAML")?,
            Self::Json => serde_json::to_string(value).context("failed to render JSON")?,
            Self::Prettyjson => {
                serde_json::to_string_pretty(value).context("failed to render JSON")?
            }
        };
        Ok(text.trim_end().to_owned())
    }

    /// One value as a standalone document.
    pub fn print<T: Serialize>(self, value: &T) -> Result<()> {
        println!("{}", self.render(value)?);
        Ok(())
    }

    /// One item of a stream. YAML items are separated with `---`; JSON items
    /// are one value each.
    pub fn print_item<T: Serialize>(self, value: &T) -> Result<()> {
        if self == Self::Yaml {
            println!("---");
        }
        self.print(value)
    }
}

/// A query or selector argument: the path of a YAML file, or inline YAML.
/// Empty input is an empty mapping.
pub fn read_document(arg: &str) -> Result<Value> {
    let path = Path::new(arg);
    let text = if path.is_file() {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    } else {
        arg.to_owned()
    };
    let value: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid YAML document: {arg}"))?;
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}
