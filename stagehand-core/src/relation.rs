//! Declared relations and the borrowed wrappers they resolve to.
//!
//! A relation field stores tags, never pointers. Every access looks the tags
//! up in the repository again, so objects added later resolve and removed
//! targets fail at access time with [`RepositoryError::UnknownObject`].

use serde_json::Value;

use crate::attribute::{json_type, split_spec};
use crate::error::RepositoryError;
use crate::object::KindObject;
use crate::repository::Repository;

// ---------------------------------------------------------------------------
// RelationDetail
// ---------------------------------------------------------------------------

/// A declared relation of a Kind to another Kind.
#[derive(Debug, Clone)]
pub struct RelationDetail {
    owner: String,
    name: String,
    spec: String,
    target: String,
    required: bool,
    list: bool,
}

impl RelationDetail {
    /// Parse a relation spec. A target without a `.` is qualified with
    /// `package`.
    pub fn parse(
        package: &str,
        owner: &str,
        name: &str,
        spec: &str,
    ) -> Result<Self, RepositoryError> {
        let invalid = |reason: &str| RepositoryError::InvalidAttributeSpec {
            kind: owner.to_owned(),
            name: name.to_owned(),
            spec: spec.to_owned(),
            reason: reason.to_owned(),
        };
        let tokens = split_spec(spec).ok_or_else(|| invalid("empty spec"))?;
        if let Some(extra) = tokens.rest.first() {
            return Err(invalid(&format!("unexpected token '{extra}'")));
        }
        Ok(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
            spec: spec.to_owned(),
            target: qualify(package, tokens.head),
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

    /// Qualified name of the target Kind.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    /// Resolve a scalar relation. Fails on list-typed relations.
    pub fn get_relation<'r>(
        &self,
        obj: &KindObject,
        repo: &'r Repository,
    ) -> Result<Relation<'r>, RepositoryError> {
        match self.get_attribute(obj, repo)? {
            Resolution::One(r) => Ok(r),
            Resolution::Many(_) => Err(self.mismatch("scalar relation", "list")),
        }
    }

    /// Resolve a list relation. Fails on scalar relations.
    pub fn get_relation_list<'r>(
        &self,
        obj: &KindObject,
        repo: &'r Repository,
    ) -> Result<RelationList<'r>, RepositoryError> {
        match self.get_attribute(obj, repo)? {
            Resolution::Many(r) => Ok(r),
            Resolution::One(_) => Err(self.mismatch("list relation", "scalar")),
        }
    }

    /// Resolve against the current repository state.
    pub fn get_attribute<'r>(
        &self,
        obj: &KindObject,
        repo: &'r Repository,
    ) -> Result<Resolution<'r>, RepositoryError> {
        let parent = obj.ref_string();
        // An explicit null reads the same as an absent field.
        let raw = match obj.fields().get(&self.name).filter(|v| !v.is_null()) {
            Some(raw) => raw,
            None if self.required => {
                return Err(RepositoryError::AttributeMissing {
                    kind: self.owner.clone(),
                    name: self.name.clone(),
                })
            }
            None if self.list => {
                return Ok(Resolution::Many(RelationList::new(parent, &self.name, None)))
            }
            None => return Ok(Resolution::One(Relation::new(parent, &self.name, None))),
        };

        if self.list {
            let Value::Array(tags) = raw else {
                return Err(self.mismatch("list of tags", json_type(raw)));
            };
            let mut items = Vec::with_capacity(tags.len());
            for tag in tags {
                items.push(self.lookup(tag, repo)?);
            }
            return Ok(Resolution::Many(RelationList::new(parent, &self.name, Some(items))));
        }

        let target = self.lookup(raw, repo)?;
        Ok(Resolution::One(Relation::new(parent, &self.name, Some(target))))
    }

    fn lookup<'r>(&self, tag: &Value, repo: &'r Repository) -> Result<&'r KindObject, RepositoryError> {
        let tag = match tag {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(self.mismatch("tag", json_type(other))),
        };
        repo.get_object(&self.target, &tag)
    }

    fn mismatch(&self, expected: &str, found: &str) -> RepositoryError {
        RepositoryError::AttributeTypeMismatch {
            kind: self.owner.clone(),
            name: self.name.clone(),
            expected: expected.to_owned(),
            found: found.to_owned(),
        }
    }
}

/// Qualify a local Kind name with its package.
pub(crate) fn qualify(package: &str, kind: &str) -> String {
    if kind.contains('.') {
        kind.to_owned()
    } else {
        format!("{package}.{kind}")
    }
}

/// A resolved relation field.
#[derive(Debug, Clone)]
pub enum Resolution<'r> {
    One(Relation<'r>),
    Many(RelationList<'r>),
}

// ---------------------------------------------------------------------------
// Relation
// ---------------------------------------------------------------------------

/// A scalar relation: one target object or nothing.
#[derive(Debug, Clone)]
pub struct Relation<'r> {
    parent: String,
    name: String,
    value: Option<&'r KindObject>,
}

impl<'r> Relation<'r> {
    fn new(parent: String, name: &str, value: Option<&'r KindObject>) -> Self {
        Self {
            parent,
            name: name.to_owned(),
            value,
        }
    }

    /// The target, if present.
    pub fn value(&self) -> Option<&'r KindObject> {
        self.value
    }

    /// The target; absent is an error.
    pub fn required(&self) -> Result<&'r KindObject, RepositoryError> {
        self.value.ok_or_else(|| RepositoryError::RelationMissing {
            obj: self.parent.clone(),
            name: self.name.clone(),
        })
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

// ---------------------------------------------------------------------------
// RelationList
// ---------------------------------------------------------------------------

/// A list relation. Absent only when the field itself is absent and optional.
#[derive(Debug, Clone)]
pub struct RelationList<'r> {
    parent: String,
    name: String,
    items: Option<Vec<&'r KindObject>>,
}

impl<'r> RelationList<'r> {
    fn new(parent: String, name: &str, items: Option<Vec<&'r KindObject>>) -> Self {
        Self {
            parent,
            name: name.to_owned(),
            items,
        }
    }

    /// The targets; an absent list is an error.
    pub fn required(&self) -> Result<&[&'r KindObject], RepositoryError> {
        self.items
            .as_deref()
            .ok_or_else(|| RepositoryError::RelationMissing {
                obj: self.parent.clone(),
                name: self.name.clone(),
            })
    }

    pub fn is_present(&self) -> bool {
        self.items.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Each target wrapped as a present [`Relation`], in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Relation<'r>> + '_ {
        self.items
            .iter()
            .flatten()
            .map(|obj| Relation::new(self.parent.clone(), &self.name, Some(*obj)))
    }

    /// Look up an element by the referenced tag; missing yields an empty
    /// [`Relation`].
    pub fn get_tag(&self, tag: &str) -> Relation<'r> {
        let found = self.items.iter().flatten().copied().find(|o| o.tag() == tag);
        Relation::new(self.parent.clone(), &self.name, found)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get_tag(tag).is_present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_targets_are_qualified() {
        let r = RelationDetail::parse("test", "test.App", "source", "Directory").unwrap();
        assert_eq!(r.target(), "test.Directory");
        assert!(r.required());
        assert!(!r.is_list());
    }

    #[test]
    fn qualified_targets_are_kept() {
        let r = RelationDetail::parse("test", "test.App", "dirs", "file.Directory optional list")
            .unwrap();
        assert_eq!(r.target(), "file.Directory");
        assert!(!r.required());
        assert!(r.is_list());
    }

    #[test]
    fn stray_tokens_are_rejected() {
        let err = RelationDetail::parse("test", "test.App", "source", "Directory string")
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidAttributeSpec { .. }));
    }
}
