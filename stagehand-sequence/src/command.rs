//! Concrete command strings: `"<pkg>.<Kind>.<task> <tag> [<yaml-args>]"`.
//!
//! Tokens are split shell-style: whitespace separates, single quotes are
//! literal, double quotes allow `\"` and `\\`, a backslash outside quotes
//! escapes the next character.

use std::fmt;

use serde_json::Value;

use stagehand_core::{Repository, TaskArgs, TaskOutput, TaskReference};

use crate::error::SequenceError;

/// A parsed command ready to invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub task: TaskReference,
    pub tag: String,
    pub args: TaskArgs,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, SequenceError> {
        let invalid = |reason: &str| SequenceError::InvalidCommand {
            command: line.to_owned(),
            reason: reason.to_owned(),
        };
        let tokens = split(line).map_err(|e| invalid(e))?;
        let (task, tag, args) = match tokens.as_slice() {
            [task, tag] => (task, tag, TaskArgs::new()),
            [task, tag, args] => (task, tag, parse_args(args).map_err(|e| invalid(&e))?),
            _ => return Err(invalid("expected '<pkg.Kind.task> <tag> [args]'")),
        };
        Ok(Self {
            task: TaskReference::parse(task)?,
            tag: tag.clone(),
            args,
        })
    }

    pub fn invoke(&self, repo: &Repository) -> Result<TaskOutput, SequenceError> {
        tracing::debug!(command = %self, "running command");
        Ok(repo.invoke_kind_task(self.task.kind(), &self.tag, self.task.name(), &self.args)?)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.task, quote(&self.tag))?;
        if !self.args.is_empty() {
            let args = Value::Object(self.args.clone()).to_string();
            write!(f, " {}", quote(&args))?;
        }
        Ok(())
    }
}

fn parse_args(text: &str) -> Result<TaskArgs, String> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(TaskArgs::new()),
        Ok(other) => Err(format!("arguments must be a mapping, got {other}")),
        Err(e) => Err(format!("arguments are not valid YAML: {e}")),
    }
}

fn split(line: &str) -> Result<Vec<String>, &'static str> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
            }
            '\'' => {
                let token = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => token.push(c),
                        None => return Err("unterminated single quote"),
                    }
                }
            }
            '"' => {
                let token = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => token.push(c),
                            Some(c) => {
                                token.push('\\');
                                token.push(c);
                            }
                            None => return Err("unterminated double quote"),
                        },
                        Some(c) => token.push(c),
                        None => return Err("unterminated double quote"),
                    }
                }
            }
            '\\' => match chars.next() {
                Some(c) => current.get_or_insert_with(String::new).push(c),
                None => return Err("trailing backslash"),
            },
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    if let Some(token) = current {
        tokens.push(token);
    }
    Ok(tokens)
}

fn quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-/:@%+=,".contains(c));
    if plain {
        token.to_owned()
    } else {
        format!("'{}'", token.replace('\'', r#"'"'"'"#))
    }
}
