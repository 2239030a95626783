//! Query documents: per-Kind selectors and their results.
//!
//! ```yaml
//! deploy.App: {tags: [a, b]}
//! deploy.Region: {labels: [abc]}
//! file.Directory: {all: true}
//! ```

use serde_json::{Map, Value};

use crate::error::RepositoryError;
use crate::object::KindObject;

/// How one Kind's objects are picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub all: bool,
    pub tags: Vec<String>,
    pub labels: Vec<String>,
}

impl Selector {
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parse `{tags: [..]}`, `{labels: [..]}` and/or `{all: true}`.
    ///
    /// A bare string stands for a one-element list. `null` selects all.
    pub fn parse(value: &Value) -> Result<Self, RepositoryError> {
        let map = match value {
            Value::Null => return Ok(Self::all()),
            Value::Object(map) => map,
            other => {
                return Err(RepositoryError::InvalidQuery(format!(
                    "selector must be a mapping, got {other}"
                )))
            }
        };
        let mut selector = Self::default();
        for (key, val) in map {
            match key.as_str() {
                "all" => {
                    selector.all = val.as_bool().ok_or_else(|| {
                        RepositoryError::InvalidQuery(format!("'all' must be a bool, got {val}"))
                    })?
                }
                "tags" => selector.tags = string_list("tags", val)?,
                "labels" => selector.labels = string_list("labels", val)?,
                other => {
                    return Err(RepositoryError::InvalidQuery(format!(
                        "unknown selector key '{other}'"
                    )))
                }
            }
        }
        selector.check()?;
        Ok(selector)
    }

    /// Label lists must not repeat entries.
    pub fn check(&self) -> Result<(), RepositoryError> {
        for (i, label) in self.labels.iter().enumerate() {
            if self.labels[..i].contains(label) {
                return Err(RepositoryError::InvalidQuery(format!(
                    "duplicate label '{label}' in selector"
                )));
            }
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if self.all {
            map.insert("all".into(), Value::Bool(true));
        }
        if !self.tags.is_empty() {
            map.insert("tags".into(), self.tags.clone().into());
        }
        if !self.labels.is_empty() {
            map.insert("labels".into(), self.labels.clone().into());
        }
        Value::Object(map)
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, RepositoryError> {
    let invalid = || RepositoryError::InvalidQuery(format!("'{key}' must be a list of strings, got {value}"));
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

/// A whole query document: Kind name to selector, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    selectors: Vec<(String, Selector)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the selector for `kind`.
    pub fn select(mut self, kind: impl Into<String>, selector: Selector) -> Self {
        let kind = kind.into();
        match self.selectors.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = selector,
            None => self.selectors.push((kind, selector)),
        }
        self
    }

    pub fn parse(value: &Value) -> Result<Self, RepositoryError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(RepositoryError::InvalidQuery(format!(
                    "query must be a mapping of kind to selector, got {other}"
                )))
            }
        };
        let selectors = map
            .iter()
            .map(|(kind, sel)| Ok((kind.clone(), Selector::parse(sel)?)))
            .collect::<Result<_, RepositoryError>>()?;
        Ok(Self { selectors })
    }

    pub fn get(&self, kind: &str) -> Option<&Selector> {
        self.selectors.iter().find(|(k, _)| k == kind).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selector)> {
        self.selectors.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

/// Output shape for a rendered query result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryShape {
    /// Raw object documents.
    #[default]
    Objects,
    /// `kind/tag` reference strings.
    Ids,
    /// Bare tags.
    Tags,
}

/// Materialized query result, one entry per queried Kind.
#[derive(Debug, Clone, Default)]
pub struct QueryResult<'r> {
    entries: Vec<(String, Vec<&'r KindObject>)>,
}

impl<'r> QueryResult<'r> {
    pub(crate) fn push(&mut self, kind: String, objects: Vec<&'r KindObject>) {
        self.entries.push((kind, objects));
    }

    /// Objects selected for `kind`; `None` if the Kind was not queried.
    pub fn get(&self, kind: &str) -> Option<&[&'r KindObject]> {
        self.entries
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, objs)| objs.as_slice())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'r KindObject])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_value(&self, shape: QueryShape) -> Value {
        let mut out = Map::new();
        for (kind, objs) in &self.entries {
            let items = objs
                .iter()
                .map(|o| match shape {
                    QueryShape::Objects => Value::Object(o.fields().clone()),
                    QueryShape::Ids => Value::String(o.ref_string()),
                    QueryShape::Tags => Value::String(o.tag().to_owned()),
                })
                .collect();
            out.insert(kind.clone(), Value::Array(items));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_selector_forms() {
        assert_eq!(Selector::parse(&json!({"all": true})).unwrap(), Selector::all());
        assert_eq!(Selector::parse(&Value::Null).unwrap(), Selector::all());
        assert_eq!(
            Selector::parse(&json!({"tags": "a"})).unwrap(),
            Selector::tags(["a"])
        );
        let both = Selector::parse(&json!({"tags": ["a"], "labels": ["x", "y"]})).unwrap();
        assert_eq!(both.tags, vec!["a"]);
        assert_eq!(both.labels, vec!["x", "y"]);
    }

    #[test]
    fn rejects_bad_selectors() {
        for bad in [
            json!({"labels": ["x", "x"]}),
            json!({"tags": {"a": 1}}),
            json!({"labels": [["x"]]}),
            json!({"every": true}),
            json!({"all": "yes"}),
            json!(["a"]),
        ] {
            assert!(
                matches!(Selector::parse(&bad), Err(RepositoryError::InvalidQuery(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn query_keeps_document_order() {
        let q = Query::parse(&json!({"b.K": {"all": true}, "a.K": {"tags": ["t"]}})).unwrap();
        assert_eq!(q.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["b.K", "a.K"]);
    }

    #[test]
    fn select_replaces_existing_kind() {
        let q = Query::new()
            .select("a.K", Selector::all())
            .select("a.K", Selector::tags(["x"]));
        assert_eq!(q.get("a.K"), Some(&Selector::tags(["x"])));
    }
}
