//! Sequence argument sets, query binding and context rows.

use serde_json::{Map, Value};

use stagehand_core::{template_view, KindObject, Query, QueryResult, Selector};

use crate::error::SequenceError;

// ---------------------------------------------------------------------------
// TaskSequenceArguments
// ---------------------------------------------------------------------------

/// A named set of free variables, each bound to one Kind.
///
/// ```yaml
/// application: {reg: deploy.Region, app: deploy.App}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSequenceArguments {
    name: String,
    variables: Vec<(String, String)>,
}

impl TaskSequenceArguments {
    pub fn new<I, V, K>(name: impl Into<String>, variables: I) -> Result<Self, SequenceError>
    where
        I: IntoIterator<Item = (V, K)>,
        V: Into<String>,
        K: Into<String>,
    {
        let name = name.into();
        let mut vars: Vec<(String, String)> = Vec::new();
        for (var, kind) in variables {
            let (var, kind) = (var.into(), kind.into());
            if vars.iter().any(|(_, k)| *k == kind) {
                return Err(SequenceError::invalid(format!(
                    "arguments {name} bind kind {kind} more than once"
                )));
            }
            vars.push((var, kind));
        }
        Ok(Self {
            name,
            variables: vars,
        })
    }

    /// Parse `{var: kind, ...}`.
    pub fn parse(name: &str, spec: &Value) -> Result<Self, SequenceError> {
        let Value::Object(map) = spec else {
            return Err(SequenceError::invalid(format!(
                "task sequence arguments {name} must be a map"
            )));
        };
        let mut vars = Vec::with_capacity(map.len());
        for (var, kind) in map {
            let Value::String(kind) = kind else {
                return Err(SequenceError::invalid(format!(
                    "variable {var} of arguments {name} must name a kind"
                )));
            };
            vars.push((var.clone(), kind.clone()));
        }
        Self::new(name, vars)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(variable, kind)` pairs in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(v, k)| (v.as_str(), k.as_str()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(_, k)| k.as_str())
    }

    pub fn kind_of(&self, variable: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(v, _)| v == variable)
            .map(|(_, k)| k.as_str())
    }

    /// True if every Kind of `other` is bound here too.
    pub fn is_compatible(&self, other: &TaskSequenceArguments) -> bool {
        other.kinds().all(|k| self.kinds().any(|own| own == k))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    pub fn assert_variable(&self, name: &str) -> Result<(), SequenceError> {
        if self.has_variable(name) {
            Ok(())
        } else {
            Err(SequenceError::UnknownVariable {
                arguments: self.name.clone(),
                variable: name.to_owned(),
            })
        }
    }

    /// Cartesian product of each variable's results, first variable
    /// outermost.
    pub fn build_context<'r>(&self, results: &QueryResult<'r>) -> Vec<ContextRow<'r>> {
        let mut rows = vec![ContextRow::default()];
        for (var, kind) in &self.variables {
            let objs = results.get(kind).unwrap_or_default();
            let mut next = Vec::with_capacity(rows.len() * objs.len());
            for row in &rows {
                for obj in objs {
                    let mut row = row.clone();
                    row.bindings.push((var.clone(), *obj));
                    next.push(row);
                }
            }
            rows = next;
        }
        rows
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.variables
                .iter()
                .map(|(v, k)| (v.clone(), Value::String(k.clone())))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// TaskSequenceQuery
// ---------------------------------------------------------------------------

/// A caller's `{variable: selector}` document turned into a Kind query.
///
/// Variables left out select everything of their Kind.
#[derive(Debug, Clone)]
pub struct TaskSequenceQuery {
    query: Query,
}

impl TaskSequenceQuery {
    pub fn new(arguments: &TaskSequenceArguments, doc: &Value) -> Result<Self, SequenceError> {
        let empty = Map::new();
        let map = match doc {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => return Err(SequenceError::invalid("task sequence query must be a map")),
        };
        for key in map.keys() {
            arguments.assert_variable(key)?;
        }
        let mut query = Query::new();
        for (var, kind) in arguments.variables() {
            let selector = match map.get(var) {
                None => Selector::all(),
                Some(value @ Value::Object(_)) => Selector::parse(value)?,
                Some(other) => {
                    return Err(SequenceError::invalid(format!(
                        "selector for variable {var} must be a map, got {other}"
                    )))
                }
            };
            query = query.select(kind, selector);
        }
        Ok(Self { query })
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

// ---------------------------------------------------------------------------
// ContextRow
// ---------------------------------------------------------------------------

/// One combination of bound objects, variable name to object.
#[derive(Debug, Clone, Default)]
pub struct ContextRow<'r> {
    bindings: Vec<(String, &'r KindObject)>,
}

impl<'r> ContextRow<'r> {
    pub fn get(&self, variable: &str) -> Option<&'r KindObject> {
        self.bindings
            .iter()
            .find(|(v, _)| v == variable)
            .map(|(_, o)| *o)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &'r KindObject)> + '_ {
        self.bindings.iter().map(|(v, o)| (v.as_str(), *o))
    }

    /// `{variable: "kind/tag"}`.
    pub fn to_refs(&self) -> Value {
        Value::Object(
            self.bindings
                .iter()
                .map(|(v, o)| (v.clone(), Value::String(o.ref_string())))
                .collect(),
        )
    }

    /// Template variables: each binding's template view.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.bindings
                .iter()
                .map(|(v, o)| (v.clone(), template_view(o)))
                .collect(),
        )
    }
}
