//! Kind declarations and the schema-bearing [`Kind`] built from them.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::attribute::{AttrValue, AttributeDetail};
use crate::error::RepositoryError;
use crate::object::KindObject;
use crate::relation::{Relation, RelationDetail, RelationList, Resolution};
use crate::repository::Repository;
use crate::task::{Implementation, Implementations, KindTasks};

/// A Kind as written in a package document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindDecl {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<String>,
    /// Overrides `configs` as the implementation tasks are bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Map::is_empty")]
    pub relations: Map<String, Value>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Value>,
    /// Undeclared keys (docs, notes) kept for dumps.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KindDecl {
    pub fn from_value(value: Value) -> Result<Self, RepositoryError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// `key:` with no value deserializes to the empty default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of [`Kind::resolve_attr`].
#[derive(Debug, Clone)]
pub enum Resolved<'r> {
    Attribute(AttrValue),
    Relation(Relation<'r>),
    RelationList(RelationList<'r>),
    /// Undeclared field, passed through raw.
    Field(Option<&'r Value>),
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// A named type, `package.Kind`, with its fields and bound tasks.
#[derive(Debug, Clone)]
pub struct Kind {
    name: String,
    local: String,
    package: String,
    decl: KindDecl,
    attributes: Vec<AttributeDetail>,
    relations: Vec<RelationDetail>,
    implementation: Option<Arc<Implementation>>,
    tasks: KindTasks,
}

impl Kind {
    /// Build a Kind of `package`, binding its tasks through `implementations`.
    ///
    /// The implementation path only has to be registered when the Kind
    /// declares tasks.
    pub fn new(
        package: &str,
        decl: KindDecl,
        implementations: &Implementations,
    ) -> Result<Self, RepositoryError> {
        let local = decl.kind.clone();
        if local.is_empty() || local.contains(['.', '/']) || local.contains(char::is_whitespace) {
            return Err(RepositoryError::InvalidKind(format!(
                "invalid kind name '{local}' in package {package}"
            )));
        }
        let name = format!("{package}.{local}");
        let configs = decl.configs.as_deref().ok_or_else(|| {
            RepositoryError::InvalidKind(format!("kind {name} has no configs implementation"))
        })?;
        let path = decl.commands.as_deref().unwrap_or(configs);

        let mut attributes = Vec::with_capacity(decl.attributes.len());
        for (field, spec) in &decl.attributes {
            attributes.push(AttributeDetail::parse(&name, field, spec_str(&name, field, spec)?)?);
        }
        let mut relations = Vec::with_capacity(decl.relations.len());
        for (field, spec) in &decl.relations {
            if decl.attributes.contains_key(field) {
                return Err(RepositoryError::DuplicateField {
                    kind: name.clone(),
                    name: field.clone(),
                });
            }
            relations.push(RelationDetail::parse(
                package,
                &name,
                field,
                spec_str(&name, field, spec)?,
            )?);
        }

        let implementation = implementations.get(path);
        let tasks = match (&implementation, decl.tasks.is_empty()) {
            (Some(imp), _) => KindTasks::new(&name, &decl.tasks, imp)?,
            (None, true) => KindTasks::new(&name, &[], &Implementation::new(path))?,
            (None, false) => {
                return Err(RepositoryError::UnknownImplementation {
                    kind: name,
                    path: path.to_owned(),
                })
            }
        };

        Ok(Self {
            name,
            local,
            package: package.to_owned(),
            decl,
            attributes,
            relations,
            implementation,
            tasks,
        })
    }

    /// Qualified name, `package.Kind`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn decl(&self) -> &KindDecl {
        &self.decl
    }

    /// The path tasks are bound through (`commands`, else `configs`).
    pub fn implementation_path(&self) -> &str {
        self.decl
            .commands
            .as_deref()
            .or(self.decl.configs.as_deref())
            .unwrap_or_default()
    }

    pub fn implementation(&self) -> Option<&Implementation> {
        self.implementation.as_deref()
    }

    pub fn attributes(&self) -> &[AttributeDetail] {
        &self.attributes
    }

    pub fn relations(&self) -> &[RelationDetail] {
        &self.relations
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDetail> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDetail> {
        self.relations.iter().find(|r| r.name() == name)
    }

    pub fn relation_detail(&self, name: &str) -> Result<&RelationDetail, RepositoryError> {
        self.relation(name).ok_or_else(|| self.unknown_field(name))
    }

    pub fn tasks(&self) -> &KindTasks {
        &self.tasks
    }

    /// A declared attribute's coerced value.
    pub fn resolve_attribute(&self, name: &str, obj: &KindObject) -> Result<AttrValue, RepositoryError> {
        self.attribute(name)
            .ok_or_else(|| self.unknown_field(name))?
            .get_attribute(obj.fields())
    }

    /// Attribute first, then relation, then the raw field.
    pub fn resolve_attr<'r>(
        &self,
        name: &str,
        obj: &'r KindObject,
        repo: &'r Repository,
    ) -> Result<Resolved<'r>, RepositoryError> {
        if let Some(attr) = self.attribute(name) {
            return attr.get_attribute(obj.fields()).map(Resolved::Attribute);
        }
        if let Some(rel) = self.relation(name) {
            return Ok(match rel.get_attribute(obj, repo)? {
                Resolution::One(r) => Resolved::Relation(r),
                Resolution::Many(r) => Resolved::RelationList(r),
            });
        }
        Ok(Resolved::Field(obj.raw(name)))
    }

    /// Every relation target must be a registered Kind.
    pub fn validate_relations(&self, repo: &Repository) -> Result<(), RepositoryError> {
        for rel in &self.relations {
            if !repo.has_kind(rel.target()) {
                return Err(RepositoryError::UnknownKind(format!(
                    "{} (relation {}.{})",
                    rel.target(),
                    self.name,
                    rel.name()
                )));
            }
        }
        Ok(())
    }

    /// Identity plus the raw value of every declared field present on `obj`.
    pub fn dump(&self, obj: &KindObject) -> Value {
        let mut out = Map::new();
        out.insert("kind".into(), Value::String(obj.kind().to_owned()));
        out.insert("tag".into(), Value::String(obj.tag().to_owned()));
        if !obj.labels().is_empty() {
            out.insert(
                "labels".into(),
                Value::Array(obj.labels().iter().cloned().map(Value::String).collect()),
            );
        }
        let declared = self
            .attributes
            .iter()
            .map(AttributeDetail::name)
            .chain(self.relations.iter().map(RelationDetail::name));
        for field in declared {
            if let Some(raw) = obj.raw(field) {
                out.insert(field.to_owned(), raw.clone());
            }
        }
        Value::Object(out)
    }

    fn unknown_field(&self, name: &str) -> RepositoryError {
        RepositoryError::UnknownField {
            kind: self.name.clone(),
            name: name.to_owned(),
        }
    }
}

fn spec_str<'a>(kind: &str, name: &str, spec: &'a Value) -> Result<&'a str, RepositoryError> {
    spec.as_str().ok_or_else(|| RepositoryError::InvalidAttributeSpec {
        kind: kind.to_owned(),
        name: name.to_owned(),
        spec: spec.to_string(),
        reason: "spec must be a string".into(),
    })
}
