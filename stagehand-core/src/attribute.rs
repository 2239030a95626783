//! Declared attributes: spec-string parsing and the coercion pipeline.
//!
//! An attribute spec is a whitespace-separated string. The first token names
//! the coercion applied to the raw field value; later tokens are the
//! modifiers `optional` and `list`, or further coercions appended to the
//! pipeline (`"envvar path"` reads an environment variable, then absolutizes
//! the result).

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RepositoryError;

// ---------------------------------------------------------------------------
// AttrValue
// ---------------------------------------------------------------------------

/// A coerced attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Path(PathBuf),
    List(Vec<AttrValue>),
    Map(Map<String, Value>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(n) => Some(*n),
            AttrValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            AttrValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short type name used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::String(_) => "string",
            AttrValue::Path(_) => "path",
            AttrValue::List(_) => "list",
            AttrValue::Map(_) => "map",
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<&Value> for AttrValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Int(i),
                None => AttrValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => AttrValue::String(s.clone()),
            Value::Array(items) => AttrValue::List(items.iter().map(AttrValue::from).collect()),
            Value::Object(m) => AttrValue::Map(m.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// One step of an attribute's coercion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    String,
    Int,
    HexInt,
    OctInt,
    Float,
    Bool,
    Path,
    EnvVar,
    List,
    Map,
}

/// Value did not fit a coercion: `(expected, found)`.
#[derive(Debug)]
pub(crate) struct Mismatch {
    pub expected: &'static str,
    pub found: String,
}

impl Coercion {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "string" => Coercion::String,
            "int" => Coercion::Int,
            "hexint" => Coercion::HexInt,
            "octint" => Coercion::OctInt,
            "float" => Coercion::Float,
            "bool" => Coercion::Bool,
            "path" => Coercion::Path,
            "envvar" => Coercion::EnvVar,
            "list" => Coercion::List,
            "map" => Coercion::Map,
            _ => return None,
        })
    }

    pub fn token(&self) -> &'static str {
        match self {
            Coercion::String => "string",
            Coercion::Int => "int",
            Coercion::HexInt => "hexint",
            Coercion::OctInt => "octint",
            Coercion::Float => "float",
            Coercion::Bool => "bool",
            Coercion::Path => "path",
            Coercion::EnvVar => "envvar",
            Coercion::List => "list",
            Coercion::Map => "map",
        }
    }

    /// Apply this step. Null passes through every step unchanged.
    pub(crate) fn apply(&self, value: AttrValue) -> Result<AttrValue, Mismatch> {
        if value.is_null() {
            return Ok(value);
        }
        let mismatch = |v: &AttrValue| Mismatch {
            expected: self.token(),
            found: v.type_name().to_owned(),
        };
        match self {
            Coercion::String => match value {
                AttrValue::String(_) => Ok(value),
                AttrValue::Bool(b) => Ok(AttrValue::String(b.to_string())),
                AttrValue::Int(n) => Ok(AttrValue::String(n.to_string())),
                AttrValue::Float(n) => Ok(AttrValue::String(n.to_string())),
                AttrValue::Path(p) => Ok(AttrValue::String(p.display().to_string())),
                other => Err(mismatch(&other)),
            },
            Coercion::Int => match &value {
                AttrValue::Int(_) => Ok(value),
                AttrValue::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(AttrValue::Int)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Coercion::HexInt => parse_radix(&value, 16, &["0x", "0X"]).ok_or_else(|| mismatch(&value)),
            Coercion::OctInt => parse_radix(&value, 8, &["0o", "0O"]).ok_or_else(|| mismatch(&value)),
            Coercion::Float => match &value {
                AttrValue::Float(_) => Ok(value),
                AttrValue::Int(n) => Ok(AttrValue::Float(*n as f64)),
                AttrValue::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(AttrValue::Float)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Coercion::Bool => match &value {
                AttrValue::Bool(_) => Ok(value),
                AttrValue::Int(0) => Ok(AttrValue::Bool(false)),
                AttrValue::Int(1) => Ok(AttrValue::Bool(true)),
                AttrValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(AttrValue::Bool(true)),
                    "false" | "no" | "off" | "0" => Ok(AttrValue::Bool(false)),
                    _ => Err(mismatch(&value)),
                },
                _ => Err(mismatch(&value)),
            },
            Coercion::Path => {
                let raw = match &value {
                    AttrValue::String(s) => PathBuf::from(s),
                    AttrValue::Path(p) => p.clone(),
                    _ => return Err(mismatch(&value)),
                };
                std::path::absolute(&raw)
                    .map(AttrValue::Path)
                    .map_err(|_| mismatch(&value))
            }
            Coercion::EnvVar => match &value {
                AttrValue::String(name) => Ok(std::env::var(name)
                    .map(AttrValue::String)
                    .unwrap_or(AttrValue::Null)),
                _ => Err(mismatch(&value)),
            },
            Coercion::List => match value {
                AttrValue::List(_) => Ok(value),
                other => Err(mismatch(&other)),
            },
            Coercion::Map => match value {
                AttrValue::Map(_) => Ok(value),
                other => Err(mismatch(&other)),
            },
        }
    }
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

fn parse_radix(value: &AttrValue, radix: u32, prefixes: &[&str]) -> Option<AttrValue> {
    let text = match value {
        AttrValue::Int(n) => n.to_string(),
        AttrValue::String(s) => s.trim().to_owned(),
        _ => return None,
    };
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.strip_prefix('+').unwrap_or(&text)),
    };
    let digits = prefixes
        .iter()
        .find_map(|p| unsigned.strip_prefix(p))
        .unwrap_or(unsigned);
    if digits.starts_with(['+', '-']) {
        return None;
    }
    i64::from_str_radix(&format!("{sign}{digits}"), radix)
        .ok()
        .map(AttrValue::Int)
}

// ---------------------------------------------------------------------------
// Spec strings
// ---------------------------------------------------------------------------

/// Tokens of a spec string shared by attribute and relation declarations.
pub(crate) struct SpecTokens<'a> {
    pub head: &'a str,
    pub optional: bool,
    pub list: bool,
    pub rest: Vec<&'a str>,
}

pub(crate) fn split_spec(spec: &str) -> Option<SpecTokens<'_>> {
    let mut tokens = spec.split_whitespace();
    let head = tokens.next()?;
    let mut parsed = SpecTokens {
        head,
        optional: false,
        list: false,
        rest: Vec::new(),
    };
    for token in tokens {
        match token {
            "optional" => parsed.optional = true,
            "list" => parsed.list = true,
            other => parsed.rest.push(other),
        }
    }
    Some(parsed)
}

// ---------------------------------------------------------------------------
// AttributeDetail
// ---------------------------------------------------------------------------

/// A declared scalar attribute of a Kind.
#[derive(Debug, Clone)]
pub struct AttributeDetail {
    kind: String,
    name: String,
    spec: String,
    pipeline: Vec<Coercion>,
    required: bool,
    list: bool,
}

impl AttributeDetail {
    /// Parse `spec` for attribute `name` of the Kind `kind`.
    pub fn parse(kind: &str, name: &str, spec: &str) -> Result<Self, RepositoryError> {
        let invalid = |reason: String| RepositoryError::InvalidAttributeSpec {
            kind: kind.to_owned(),
            name: name.to_owned(),
            spec: spec.to_owned(),
            reason,
        };
        let tokens = split_spec(spec).ok_or_else(|| invalid("empty spec".into()))?;
        let mut pipeline = Vec::with_capacity(1 + tokens.rest.len());
        for token in std::iter::once(tokens.head).chain(tokens.rest.iter().copied()) {
            let step = Coercion::from_token(token)
                .ok_or_else(|| invalid(format!("unknown type '{token}'")))?;
            pipeline.push(step);
        }
        Ok(Self {
            kind: kind.to_owned(),
            name: name.to_owned(),
            spec: spec.to_owned(),
            pipeline,
            required: !tokens.optional,
            list: tokens.list,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn pipeline(&self) -> &[Coercion] {
        &self.pipeline
    }

    /// Run the coercion pipeline over a raw value.
    pub fn parse_value(&self, raw: &Value) -> Result<AttrValue, RepositoryError> {
        if self.list {
            let Value::Array(items) = raw else {
                return Err(self.mismatch("list", json_type(raw)));
            };
            return items
                .iter()
                .map(|item| self.run_pipeline(AttrValue::from(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(AttrValue::List);
        }
        self.run_pipeline(AttrValue::from(raw))
    }

    /// Resolve this attribute against an object's raw fields.
    ///
    /// Absent + required fails; absent + optional yields `Null` (or an empty
    /// list when list-typed).
    pub fn get_attribute(&self, fields: &Map<String, Value>) -> Result<AttrValue, RepositoryError> {
        match fields.get(&self.name) {
            Some(raw) => self.parse_value(raw),
            None if self.required => Err(RepositoryError::AttributeMissing {
                kind: self.kind.clone(),
                name: self.name.clone(),
            }),
            None if self.list => Ok(AttrValue::List(Vec::new())),
            None => Ok(AttrValue::Null),
        }
    }

    fn run_pipeline(&self, mut value: AttrValue) -> Result<AttrValue, RepositoryError> {
        for step in &self.pipeline {
            value = step
                .apply(value)
                .map_err(|m| self.mismatch(m.expected, m.found))?;
        }
        Ok(value)
    }

    fn mismatch(&self, expected: &str, found: impl Into<String>) -> RepositoryError {
        RepositoryError::AttributeTypeMismatch {
            kind: self.kind.clone(),
            name: self.name.clone(),
            expected: expected.to_owned(),
            found: found.into(),
        }
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
