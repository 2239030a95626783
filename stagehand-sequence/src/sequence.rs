//! Named task sequences and their expansion into command strings.
//!
//! ```yaml
//! arguments:
//!   region: {reg: deploy.Region}
//!   application: {reg: deploy.Region, app: deploy.App}
//! sequences:
//!   region_login:
//!     region:
//!       - cmd: deploy.Region.login {{reg.tag}}
//!   deploy_app:
//!     application:
//!       - seq: region_login
//!       - cmd: deploy.RegionApp.push_app {{reg.tag}}_{{app.tag}}
//! ```
//!
//! Expansion walks a body top to bottom. A `seq` entry expands the named
//! sequence against the same query results; a `cmd` entry renders once per
//! context row.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;

use serde_json::{Map, Value};

use stagehand_core::{loader, QueryResult, Repository, TaskOutput};

use crate::arguments::{ContextRow, TaskSequenceArguments, TaskSequenceQuery};
use crate::command::Command;
use crate::error::SequenceError;
use crate::template::CommandTemplates;

// ---------------------------------------------------------------------------
// SubTaskSequence / TaskSequence
// ---------------------------------------------------------------------------

/// One body entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTaskSequence {
    /// `cmd:` (or `task:`): a command template, compiled as `template`.
    Command { source: String, template: String },
    /// `seq:`: another sequence by name.
    Sequence { name: String },
}

impl SubTaskSequence {
    fn parse(sequence: &str, index: usize, value: &Value) -> Result<Self, SequenceError> {
        let entry = match value {
            Value::Object(map) if map.len() == 1 => map.iter().next(),
            _ => None,
        };
        let Some((kind, body)) = entry else {
            return Err(SequenceError::invalid(format!(
                "subtask {index} of {sequence} must be a single-key map"
            )));
        };
        let Value::String(body) = body else {
            return Err(SequenceError::invalid(format!(
                "subtask {index} of {sequence} must set a string"
            )));
        };
        match kind.as_str() {
            "cmd" | "task" => Ok(SubTaskSequence::Command {
                source: body.clone(),
                template: format!("{sequence}#{index}"),
            }),
            "seq" => Ok(SubTaskSequence::Sequence { name: body.clone() }),
            other => Err(SequenceError::UnknownSubtaskType(other.to_owned())),
        }
    }

    pub fn type_token(&self) -> &'static str {
        match self {
            SubTaskSequence::Command { .. } => "cmd",
            SubTaskSequence::Sequence { .. } => "seq",
        }
    }

    fn to_value(&self) -> Value {
        let body = match self {
            SubTaskSequence::Command { source, .. } => source,
            SubTaskSequence::Sequence { name } => name,
        };
        let mut map = Map::new();
        map.insert(self.type_token().into(), Value::String(body.clone()));
        Value::Object(map)
    }
}

/// A named sequence: its argument set and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSequence {
    name: String,
    arguments: String,
    body: Vec<SubTaskSequence>,
}

impl TaskSequence {
    /// Parse `{argument_set: [subtask, ...]}`.
    pub fn parse(name: &str, value: &Value) -> Result<Self, SequenceError> {
        let entry = match value {
            Value::Object(map) if map.len() == 1 => map.iter().next(),
            _ => None,
        };
        let Some((arguments, body)) = entry else {
            return Err(SequenceError::invalid(format!(
                "task sequence {name} must have exactly one argument set"
            )));
        };
        let Value::Array(items) = body else {
            return Err(SequenceError::invalid(format!(
                "task sequence {name} must be a list"
            )));
        };
        let body = items
            .iter()
            .enumerate()
            .map(|(i, item)| SubTaskSequence::parse(name, i, item))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            name: name.to_owned(),
            arguments: arguments.clone(),
            body,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the argument set.
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn body(&self) -> &[SubTaskSequence] {
        &self.body
    }

    /// Names of the nested sequences, in body order.
    pub fn subsequences(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|s| match s {
            SubTaskSequence::Sequence { name } => Some(name.as_str()),
            SubTaskSequence::Command { .. } => None,
        })
    }
}

/// Counts from [`TaskSequences::run_sequence_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub executed: usize,
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// TaskSequences
// ---------------------------------------------------------------------------

/// Every argument set and sequence of a task-sequence document.
#[derive(Debug)]
pub struct TaskSequences {
    arguments: Vec<TaskSequenceArguments>,
    sequences: Vec<TaskSequence>,
    templates: CommandTemplates,
}

impl TaskSequences {
    /// Build from one document holding both `arguments` and `sequences`.
    pub fn from_value(doc: &Value) -> Result<Self, SequenceError> {
        Self::from_documents(std::slice::from_ref(doc))
    }

    /// Merge several documents. Each may hold `arguments`, `sequences` or
    /// both; names must be unique across all of them.
    pub fn from_documents(docs: &[Value]) -> Result<Self, SequenceError> {
        let mut arguments: Vec<TaskSequenceArguments> = Vec::new();
        let mut sequences: Vec<TaskSequence> = Vec::new();
        let (mut saw_arguments, mut saw_sequences) = (false, false);

        for doc in docs {
            let Value::Object(map) = doc else {
                return Err(SequenceError::invalid("task sequence document must be a map"));
            };
            for (key, section) in map {
                let Value::Object(section) = section else {
                    return Err(SequenceError::invalid(format!(
                        "task sequences \"{key}\" are invalid"
                    )));
                };
                match key.as_str() {
                    "arguments" => {
                        saw_arguments = true;
                        for (name, spec) in section {
                            if arguments.iter().any(|a| a.name() == name) {
                                return Err(SequenceError::invalid(format!(
                                    "task argument {name} declared twice"
                                )));
                            }
                            arguments.push(TaskSequenceArguments::parse(name, spec)?);
                        }
                    }
                    "sequences" => {
                        saw_sequences = true;
                        for (name, spec) in section {
                            if sequences.iter().any(|s| s.name() == name) {
                                return Err(SequenceError::invalid(format!(
                                    "task sequence {name} declared twice"
                                )));
                            }
                            sequences.push(TaskSequence::parse(name, spec)?);
                        }
                    }
                    other => {
                        return Err(SequenceError::invalid(format!(
                            "unknown task sequence section \"{other}\""
                        )))
                    }
                }
            }
        }
        if !saw_arguments {
            return Err(SequenceError::invalid("task sequences \"arguments\" are invalid"));
        }
        if !saw_sequences {
            return Err(SequenceError::invalid("task sequences \"sequences\" are invalid"));
        }

        let templates = CommandTemplates::new(sequences.iter().flat_map(|s| {
            s.body.iter().filter_map(|sub| match sub {
                SubTaskSequence::Command { source, template } => {
                    Some((template.clone(), source.clone()))
                }
                SubTaskSequence::Sequence { .. } => None,
            })
        }))?;
        let sequences = Self {
            arguments,
            sequences,
            templates,
        };
        sequences.validate_sequences()?;
        tracing::debug!(
            arguments = sequences.arguments.len(),
            sequences = sequences.sequences.len(),
            "task sequences loaded"
        );
        Ok(sequences)
    }

    /// Read every document under `path`.
    pub fn load_file(path: &Path) -> Result<Self, SequenceError> {
        let docs = loader::read_documents(path)?;
        let sequences = Self::from_documents(&docs)?;
        tracing::info!(path = %path.display(), sequences = sequences.sequences.len(), "loaded task sequences");
        Ok(sequences)
    }

    /// Argument sets exist, nested sequences exist and are compatible, and
    /// no sequence reaches itself.
    pub fn validate_sequences(&self) -> Result<(), SequenceError> {
        for sequence in &self.sequences {
            let own = self.get_argument(&sequence.arguments)?;
            for child in sequence.subsequences() {
                let child_args = self.get_argument(&self.get_sequence(child)?.arguments)?;
                if !own.is_compatible(child_args) {
                    return Err(SequenceError::IncompatibleArguments {
                        parent: sequence.name.clone(),
                        child: child.to_owned(),
                    });
                }
            }
        }
        let mut state: HashMap<&str, bool> = HashMap::new();
        for sequence in &self.sequences {
            self.check_cycle(&sequence.name, &mut state)?;
        }
        Ok(())
    }

    // state: false = on the current path, true = done
    fn check_cycle<'a>(
        &'a self,
        name: &'a str,
        state: &mut HashMap<&'a str, bool>,
    ) -> Result<(), SequenceError> {
        match state.get(name) {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(SequenceError::invalid(format!(
                    "task sequence {name} includes itself"
                )))
            }
            None => {}
        }
        state.insert(name, false);
        for child in self.get_sequence(name)?.subsequences() {
            self.check_cycle(child, state)?;
        }
        state.insert(name, true);
        Ok(())
    }

    pub fn get_argument(&self, name: &str) -> Result<&TaskSequenceArguments, SequenceError> {
        self.arguments
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| SequenceError::UnknownArgument(name.to_owned()))
    }

    pub fn get_sequence(&self, name: &str) -> Result<&TaskSequence, SequenceError> {
        self.sequences
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| SequenceError::UnknownSequence(name.to_owned()))
    }

    pub fn arguments(&self) -> impl Iterator<Item = &TaskSequenceArguments> {
        self.arguments.iter()
    }

    pub fn sequences(&self) -> impl Iterator<Item = &TaskSequence> {
        self.sequences.iter()
    }

    /// Sequence names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(TaskSequence::name)
    }

    /// Nested sequences named at the top level of `name`'s body.
    pub fn subsequences(&self, name: &str) -> Result<Vec<String>, SequenceError> {
        Ok(self
            .get_sequence(name)?
            .subsequences()
            .map(str::to_owned)
            .collect())
    }

    /// Bind `query` to `name`'s arguments and run it.
    fn query<'r>(
        &self,
        repo: &'r Repository,
        query: &Value,
        name: &str,
    ) -> Result<(&TaskSequence, QueryResult<'r>), SequenceError> {
        let sequence = self.get_sequence(name)?;
        let arguments = self.get_argument(&sequence.arguments)?;
        let bound = TaskSequenceQuery::new(arguments, query)?;
        Ok((sequence, repo.query(bound.query())?))
    }

    /// Context rows of `name` for `query`.
    pub fn resolve_context<'r>(
        &self,
        repo: &'r Repository,
        query: &Value,
        name: &str,
    ) -> Result<Vec<ContextRow<'r>>, SequenceError> {
        let (sequence, results) = self.query(repo, query, name)?;
        Ok(self.get_argument(&sequence.arguments)?.build_context(&results))
    }

    /// Expand `name` into its ordered command strings.
    pub fn resolve(&self, repo: &Repository, query: &Value, name: &str) -> Result<Vec<String>, SequenceError> {
        let (sequence, results) = self.query(repo, query, name)?;
        let mut commands = Vec::new();
        self.expand(sequence, &results, &mut commands)?;
        tracing::info!(sequence = name, commands = commands.len(), "resolved task sequence");
        Ok(commands)
    }

    fn expand(
        &self,
        sequence: &TaskSequence,
        results: &QueryResult<'_>,
        commands: &mut Vec<String>,
    ) -> Result<(), SequenceError> {
        let arguments = self.get_argument(&sequence.arguments)?;
        let mut rows = None;
        for sub in &sequence.body {
            match sub {
                SubTaskSequence::Sequence { name } => {
                    self.expand(self.get_sequence(name)?, results, commands)?
                }
                SubTaskSequence::Command { template, .. } => {
                    let rows = rows.get_or_insert_with(|| arguments.build_context(results));
                    for row in rows.iter() {
                        commands.push(self.templates.render(template, row)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve and run `name`, collecting every output. The first failure
    /// aborts the run.
    pub fn run_sequence(&self, repo: &Repository, query: &Value, name: &str) -> Result<Vec<TaskOutput>, SequenceError> {
        let mut outputs = Vec::new();
        self.run_sequence_with(repo, query, name, |out| {
            outputs.push(out);
            ControlFlow::Continue(())
        })?;
        Ok(outputs)
    }

    /// Resolve and run `name`, handing each output to `on_output`, which may
    /// stop the run before the next command.
    pub fn run_sequence_with<F>(
        &self,
        repo: &Repository,
        query: &Value,
        name: &str,
        mut on_output: F,
    ) -> Result<RunSummary, SequenceError>
    where
        F: FnMut(TaskOutput) -> ControlFlow<()>,
    {
        let commands = self.resolve(repo, query, name)?;
        let mut summary = RunSummary {
            total: commands.len(),
            executed: 0,
            stopped: false,
        };
        for line in &commands {
            let output = Command::parse(line)?.invoke(repo)?;
            summary.executed += 1;
            if on_output(output).is_break() {
                summary.stopped = summary.executed < summary.total;
                break;
            }
        }
        Ok(summary)
    }

    /// Nested view of `name`: its arguments and body, `seq` entries
    /// expanded in place.
    pub fn tree(&self, name: &str) -> Result<Value, SequenceError> {
        let sequence = self.get_sequence(name)?;
        let body = sequence
            .body
            .iter()
            .map(|sub| match sub {
                SubTaskSequence::Sequence { name } => {
                    let mut map = Map::new();
                    map.insert("seq".into(), self.tree(name)?);
                    Ok(Value::Object(map))
                }
                SubTaskSequence::Command { .. } => Ok(sub.to_value()),
            })
            .collect::<Result<Vec<_>, SequenceError>>()?;
        let mut map = Map::new();
        map.insert("name".into(), Value::String(sequence.name.clone()));
        map.insert("arguments".into(), Value::String(sequence.arguments.clone()));
        map.insert("body".into(), Value::Array(body));
        Ok(Value::Object(map))
    }

    /// The document this was built from.
    pub fn to_value(&self) -> Value {
        let arguments: Map<String, Value> = self
            .arguments
            .iter()
            .map(|a| (a.name().to_owned(), a.to_value()))
            .collect();
        let sequences: Map<String, Value> = self
            .sequences
            .iter()
            .map(|s| {
                let mut body = Map::new();
                body.insert(
                    s.arguments.clone(),
                    Value::Array(s.body.iter().map(SubTaskSequence::to_value).collect()),
                );
                (s.name.clone(), Value::Object(body))
            })
            .collect();
        let mut doc = Map::new();
        doc.insert("arguments".into(), Value::Object(arguments));
        doc.insert("sequences".into(), Value::Object(sequences));
        Value::Object(doc)
    }
}
