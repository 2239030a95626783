//! Package documents.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::RepositoryError;
use crate::kind::{nullable, KindDecl};

/// A package as written in a package document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDecl {
    pub package: String,
    #[serde(default, deserialize_with = "version_string")]
    pub version: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub kinds: Vec<KindDecl>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            package: name.into(),
            version: String::new(),
            dependencies: Vec::new(),
            kinds: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, RepositoryError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// YAML writes `version: 1.0` as a float; keep it textual.
fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A registered package. Its Kinds live in the repository.
#[derive(Debug, Clone)]
pub struct Package {
    decl: PackageDecl,
}

impl Package {
    pub(crate) fn new(decl: PackageDecl) -> Result<Self, RepositoryError> {
        let name = &decl.package;
        if name.is_empty() || name.contains(['/', '.']) || name.contains(char::is_whitespace) {
            return Err(RepositoryError::InvalidKind(format!(
                "invalid package name '{name}'"
            )));
        }
        Ok(Self { decl })
    }

    pub fn name(&self) -> &str {
        &self.decl.package
    }

    pub fn version(&self) -> &str {
        &self.decl.version
    }

    pub fn dependencies(&self) -> &[String] {
        &self.decl.dependencies
    }

    /// Qualified names of the package's Kinds, in declaration order.
    pub fn kind_names(&self) -> impl Iterator<Item = String> + '_ {
        self.decl
            .kinds
            .iter()
            .map(move |k| format!("{}.{}", self.decl.package, k.kind))
    }

    pub fn decl(&self) -> &PackageDecl {
        &self.decl
    }

    pub(crate) fn push_kind(&mut self, kind: KindDecl) {
        self.decl.kinds.push(kind);
    }

    pub fn to_value(&self) -> Result<Value, RepositoryError> {
        Ok(serde_json::to_value(&self.decl)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_package_document() {
        let decl = PackageDecl::from_value(json!({
            "package": "deploy",
            "version": 0.1,
            "dependencies": ["file"],
            "kinds": [{"kind": "Region", "configs": "deploy.Region"}],
        }))
        .unwrap();
        assert_eq!(decl.version, "0.1");
        let pkg = Package::new(decl).unwrap();
        assert_eq!(pkg.kind_names().collect::<Vec<_>>(), vec!["deploy.Region"]);
        assert_eq!(pkg.dependencies(), &["file".to_string()]);
    }

    #[test]
    fn empty_sections_default() {
        let decl = PackageDecl::from_value(json!({"package": "p", "kinds": null})).unwrap();
        assert!(decl.kinds.is_empty());
        assert_eq!(decl.version, "");
    }

    #[test]
    fn dotted_package_name_is_invalid() {
        let err = Package::new(PackageDecl::new("a.b")).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidKind(_)));
    }
}
