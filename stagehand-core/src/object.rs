//! A single object of a Kind, and its repository-bound view.

use serde_json::{Map, Value};

use crate::attribute::AttrValue;
use crate::error::RepositoryError;
use crate::kind::{Kind, Resolved};
use crate::reference::Reference;
use crate::relation::{Relation, RelationList};
use crate::repository::Repository;

/// Field names owned by the store itself.
const RESERVED: &[&str] = &["kind", "tag", "labels"];

/// Tags appear bare in command lines, so they may not hold `/`,
/// whitespace, quotes or backslashes.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '\'' | '"' | '\\'))
}

/// One object: identity, labels and its raw field document.
///
/// `kind` is the qualified Kind name, a back-reference only. The raw
/// document is kept whole so undeclared fields pass through to templates and
/// dumps.
#[derive(Debug, Clone, PartialEq)]
pub struct KindObject {
    kind: String,
    tag: String,
    labels: Vec<String>,
    fields: Map<String, Value>,
}

impl KindObject {
    /// Build from a raw object document (`{kind, tag, labels, ...}`).
    pub fn from_value(doc: Value) -> Result<Self, RepositoryError> {
        let fields = match doc {
            Value::Object(fields) => fields,
            other => {
                return Err(RepositoryError::InvalidObject(format!(
                    "object document must be a mapping: {other}"
                )))
            }
        };
        let kind = match fields.get("kind") {
            Some(Value::String(k)) if !k.is_empty() => k.clone(),
            _ => {
                return Err(RepositoryError::InvalidObject(
                    "object document has no kind".into(),
                ))
            }
        };
        let tag = match fields.get("tag") {
            Some(Value::String(t)) if is_valid_tag(t) => t.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(RepositoryError::InvalidObject(format!(
                    "object of kind {kind} has no valid tag"
                )))
            }
        };
        let labels = match fields.get("labels") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|l| match l {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(RepositoryError::InvalidObject(format!(
                        "label of {kind}/{tag} must be a string, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(RepositoryError::InvalidObject(format!(
                    "labels of {kind}/{tag} must be a list, got {other}"
                )))
            }
        };
        Ok(Self {
            kind,
            tag,
            labels,
            fields,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The raw document, including `kind`, `tag` and `labels`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Raw field lookup, bypassing the schema.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// `"<kind>/<tag>"`.
    pub fn ref_string(&self) -> String {
        format!("{}/{}", self.kind, self.tag)
    }

    pub fn reference(&self) -> Reference {
        Reference::object(&self.kind, &self.tag)
    }

    /// Write a field value. Identity fields cannot be rewritten.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RepositoryError> {
        if RESERVED.contains(&name) {
            return Err(RepositoryError::InvalidObject(format!(
                "field '{name}' of {} cannot be rewritten",
                self.ref_string()
            )));
        }
        self.fields.insert(name.to_owned(), value);
        Ok(())
    }

    /// Bind to a repository for schema-aware access.
    pub fn bind<'r>(&'r self, repo: &'r Repository) -> BoundObject<'r> {
        BoundObject { obj: self, repo }
    }
}

// ---------------------------------------------------------------------------
// BoundObject
// ---------------------------------------------------------------------------

/// An object paired with the repository it lives in.
///
/// This is what task handlers receive: field reads go through the Kind's
/// declarations, relations resolve against current repository state.
#[derive(Debug, Clone, Copy)]
pub struct BoundObject<'r> {
    obj: &'r KindObject,
    repo: &'r Repository,
}

impl<'r> BoundObject<'r> {
    pub fn object(&self) -> &'r KindObject {
        self.obj
    }

    pub fn repo(&self) -> &'r Repository {
        self.repo
    }

    pub fn tag(&self) -> &'r str {
        self.obj.tag()
    }

    pub fn ref_string(&self) -> String {
        self.obj.ref_string()
    }

    pub fn kind(&self) -> Result<&'r Kind, RepositoryError> {
        self.repo.get_kind(self.obj.kind())
    }

    /// Resolve `name`: declared attribute, then relation, then raw field.
    pub fn get(&self, name: &str) -> Result<Resolved<'r>, RepositoryError> {
        self.kind()?.resolve_attr(name, self.obj, self.repo)
    }

    /// A declared attribute's coerced value.
    pub fn attr(&self, name: &str) -> Result<AttrValue, RepositoryError> {
        self.kind()?.resolve_attribute(name, self.obj)
    }

    /// A declared attribute that must resolve to a string.
    pub fn string(&self, name: &str) -> Result<Option<String>, RepositoryError> {
        match self.attr(name)? {
            AttrValue::Null => Ok(None),
            AttrValue::String(s) => Ok(Some(s)),
            other => Err(RepositoryError::AttributeTypeMismatch {
                kind: self.obj.kind().to_owned(),
                name: name.to_owned(),
                expected: "string".into(),
                found: other.type_name().into(),
            }),
        }
    }

    /// A declared scalar relation.
    pub fn relation(&self, name: &str) -> Result<Relation<'r>, RepositoryError> {
        self.kind()?
            .relation_detail(name)?
            .get_relation(self.obj, self.repo)
    }

    /// A declared list relation.
    pub fn relations(&self, name: &str) -> Result<RelationList<'r>, RepositoryError> {
        self.kind()?
            .relation_detail(name)?
            .get_relation_list(self.obj, self.repo)
    }

    /// The template view: raw fields plus `ref`.
    pub fn to_json(&self) -> Value {
        template_view(self.obj)
    }
}

/// Map exposed to command templates: every raw field, `labels` always
/// present, plus `ref`.
pub fn template_view(obj: &KindObject) -> Value {
    let mut view = obj.fields.clone();
    view.insert("kind".into(), Value::String(obj.kind.clone()));
    view.insert("tag".into(), Value::String(obj.tag.clone()));
    view.insert(
        "labels".into(),
        Value::Array(obj.labels.iter().cloned().map(Value::String).collect()),
    );
    view.insert("ref".into(), Value::String(obj.ref_string()));
    Value::Object(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_document() {
        let obj = KindObject::from_value(json!({
            "kind": "test.Region", "tag": "r1", "labels": ["region1"], "url": "http://r1"
        }))
        .unwrap();
        assert_eq!(obj.kind(), "test.Region");
        assert_eq!(obj.tag(), "r1");
        assert_eq!(obj.labels(), &["region1".to_string()]);
        assert_eq!(obj.ref_string(), "test.Region/r1");
        assert_eq!(obj.raw("url"), Some(&json!("http://r1")));
    }

    #[test]
    fn numeric_tags_are_stringified() {
        let obj = KindObject::from_value(json!({"kind": "a.B", "tag": 7})).unwrap();
        assert_eq!(obj.tag(), "7");
        assert!(obj.labels().is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        for doc in [
            json!("nope"),
            json!({"tag": "x"}),
            json!({"kind": "a.B"}),
            json!({"kind": "a.B", "tag": "x/y"}),
            json!({"kind": "a.B", "tag": "my region"}),
            json!({"kind": "a.B", "tag": "it's"}),
            json!({"kind": "a.B", "tag": "tab\there"}),
            json!({"kind": "a.B", "tag": "x", "labels": "l"}),
            json!({"kind": "a.B", "tag": "x", "labels": [1]}),
        ] {
            assert!(
                matches!(KindObject::from_value(doc.clone()), Err(RepositoryError::InvalidObject(_))),
                "accepted {doc}"
            );
        }
    }

    #[test]
    fn set_writes_fields_but_not_identity() {
        let mut obj = KindObject::from_value(json!({"kind": "a.B", "tag": "x"})).unwrap();
        obj.set("name", json!("./web")).unwrap();
        assert_eq!(obj.raw("name"), Some(&json!("./web")));
        assert!(obj.set("tag", json!("y")).is_err());
        assert!(obj.set("labels", json!([])).is_err());
    }

    #[test]
    fn template_view_exposes_ref_and_labels() {
        let obj = KindObject::from_value(json!({"kind": "a.B", "tag": "x", "org": "me"})).unwrap();
        let view = template_view(&obj);
        assert_eq!(view["ref"], json!("a.B/x"));
        assert_eq!(view["labels"], json!([]));
        assert_eq!(view["org"], json!("me"));
    }
}
