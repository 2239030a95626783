//! Parsed `kind/tag` and `pkg.Kind.task` reference strings.

use std::fmt;
use std::str::FromStr;

use crate::error::RepositoryError;

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// A reference to a Kind (`"deploy.Region"`) or to one of its objects
/// (`"deploy.Region/abc1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: String,
    pub tag: Option<String>,
}

impl Reference {
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        let invalid = || RepositoryError::InvalidReference(s.to_owned());
        let mut parts = s.split('/');
        let kind = parts.next().filter(|k| !k.is_empty()).ok_or_else(invalid)?;
        let tag = match parts.next() {
            None => None,
            Some("") => return Err(invalid()),
            Some(tag) => Some(tag.to_owned()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            kind: kind.to_owned(),
            tag,
        })
    }

    pub fn object(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            tag: Some(tag.into()),
        }
    }
}

impl FromStr for Reference {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}/{}", self.kind, tag),
            None => self.kind.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskReference
// ---------------------------------------------------------------------------

/// A `"<package>.<Kind>.<task>"` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskReference {
    kind: String,
    name: String,
}

impl TaskReference {
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(RepositoryError::InvalidTaskReference(s.to_owned()));
        }
        Ok(Self {
            kind: format!("{}.{}", parts[0], parts[1]),
            name: parts[2].to_owned(),
        })
    }

    /// Qualified Kind name, `package.Kind`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for TaskReference {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_only() {
        let r = Reference::parse("deploy.Region").unwrap();
        assert_eq!(r.kind, "deploy.Region");
        assert_eq!(r.tag, None);
        assert_eq!(r.to_string(), "deploy.Region");
    }

    #[test]
    fn kind_and_tag() {
        let r: Reference = "deploy.Region/abc1".parse().unwrap();
        assert_eq!(r, Reference::object("deploy.Region", "abc1"));
        assert_eq!(r.to_string(), "deploy.Region/abc1");
    }

    #[test]
    fn malformed_references_are_rejected() {
        for bad in ["", "/abc", "deploy.Region/", "a/b/c"] {
            assert!(
                matches!(Reference::parse(bad), Err(RepositoryError::InvalidReference(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn task_reference_splits_kind_and_name() {
        let t = TaskReference::parse("file.File.render_template").unwrap();
        assert_eq!(t.kind(), "file.File");
        assert_eq!(t.name(), "render_template");
        assert_eq!(t.to_string(), "file.File.render_template");
    }

    #[test]
    fn task_reference_needs_three_parts() {
        for bad in ["file.File", "a.b.c.d", "a..c", "login"] {
            assert!(TaskReference::parse(bad).is_err(), "accepted {bad:?}");
        }
    }
}
