//! The [`Repository`]: packages, Kinds and every object, in one place.
//!
//! # Load order
//!
//! ```text
//! add_package(..)*  ->  validate_packages()  ->  add(..)*
//! ```
//!
//! Adding a new package closes the gate again: `add` fails with
//! [`RepositoryError::PackagesNotValidated`] until the next successful
//! `validate_packages`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RepositoryError;
use crate::kind::{Kind, KindDecl};
use crate::loader;
use crate::object::KindObject;
use crate::objects::KindObjects;
use crate::package::{Package, PackageDecl};
use crate::query::{Query, QueryResult, Selector};
use crate::reference::{Reference, TaskReference};
use crate::task::{Implementations, TaskArgs};

/// Record of one task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Qualified task name, `pkg.Kind.task`.
    pub task: String,
    /// `kind/tag` of the object the task ran against.
    pub obj: String,
    pub time: DateTime<Utc>,
    /// Seconds.
    pub duration: f64,
    pub result: Value,
}

/// What a `kind` or `kind/tag` reference resolves to.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'r> {
    Kind(&'r KindObjects),
    Object(&'r KindObject),
}

impl<'r> Lookup<'r> {
    pub fn object(self) -> Option<&'r KindObject> {
        match self {
            Lookup::Object(obj) => Some(obj),
            Lookup::Kind(_) => None,
        }
    }

    pub fn objects(self) -> Option<&'r KindObjects> {
        match self {
            Lookup::Kind(objs) => Some(objs),
            Lookup::Object(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Repository {
    implementations: Implementations,
    packages: Vec<Package>,
    kinds: Vec<Kind>,
    objects: HashMap<String, KindObjects>,
    pending_validation: bool,
}

impl Repository {
    pub fn new(implementations: Implementations) -> Self {
        Self {
            implementations,
            ..Self::default()
        }
    }

    pub fn implementations(&self) -> &Implementations {
        &self.implementations
    }

    // -- schema ---------------------------------------------------------------

    /// Register a package and create an empty collection per Kind.
    ///
    /// A package already registered under the same name is left untouched.
    pub fn add_package(&mut self, decl: PackageDecl) -> Result<&Package, RepositoryError> {
        if let Some(idx) = self.package_index(&decl.package) {
            tracing::debug!(package = %decl.package, "package already registered");
            return Ok(&self.packages[idx]);
        }
        let package = Package::new(decl)?;
        let mut kinds: Vec<Kind> = Vec::with_capacity(package.decl().kinds.len());
        for kind_decl in &package.decl().kinds {
            let kind = Kind::new(package.name(), kind_decl.clone(), &self.implementations)?;
            if kinds.iter().any(|k| k.name() == kind.name()) {
                return Err(RepositoryError::InvalidKind(format!(
                    "kind {} declared twice",
                    kind.name()
                )));
            }
            kinds.push(kind);
        }
        tracing::debug!(package = %package.name(), kinds = kinds.len(), "registered package");
        for kind in kinds {
            self.objects
                .insert(kind.name().to_owned(), KindObjects::new(kind.name()));
            self.kinds.push(kind);
        }
        self.packages.push(package);
        self.pending_validation = true;
        Ok(&self.packages[self.packages.len() - 1])
    }

    /// Extend a registered package with one more Kind.
    pub fn append_kind(&mut self, package: &str, decl: KindDecl) -> Result<&Kind, RepositoryError> {
        let idx = self
            .package_index(package)
            .ok_or_else(|| RepositoryError::UnknownPackage(package.to_owned()))?;
        let kind = Kind::new(package, decl.clone(), &self.implementations)?;
        if self.has_kind(kind.name()) {
            return Err(RepositoryError::InvalidKind(format!(
                "kind {} declared twice",
                kind.name()
            )));
        }
        self.packages[idx].push_kind(decl);
        self.objects
            .insert(kind.name().to_owned(), KindObjects::new(kind.name()));
        self.kinds.push(kind);
        self.pending_validation = true;
        Ok(&self.kinds[self.kinds.len() - 1])
    }

    /// Drop a package, its Kinds and all their objects.
    pub fn remove_package(&mut self, name: &str) -> Result<Package, RepositoryError> {
        let idx = self
            .package_index(name)
            .ok_or_else(|| RepositoryError::UnknownPackage(name.to_owned()))?;
        let package = self.packages.remove(idx);
        self.kinds.retain(|k| k.package() != name);
        for kind in package.kind_names() {
            self.objects.remove(&kind);
        }
        self.pending_validation = true;
        Ok(package)
    }

    /// Check relation targets and package dependencies.
    pub fn validate_packages(&mut self) -> Result<(), RepositoryError> {
        for package in &self.packages {
            for dep in package.dependencies() {
                if self.package_index(dep).is_none() {
                    return Err(RepositoryError::UnknownPackage(format!(
                        "{dep} (dependency of {})",
                        package.name()
                    )));
                }
            }
        }
        for kind in &self.kinds {
            kind.validate_relations(self)?;
        }
        self.pending_validation = false;
        tracing::debug!(packages = self.packages.len(), kinds = self.kinds.len(), "packages validated");
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        !self.pending_validation
    }

    pub fn get_package(&self, name: &str) -> Result<&Package, RepositoryError> {
        self.package_index(name)
            .map(|idx| &self.packages[idx])
            .ok_or_else(|| RepositoryError::UnknownPackage(name.to_owned()))
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn has_kind(&self, name: &str) -> bool {
        self.kinds.iter().any(|k| k.name() == name)
    }

    pub fn get_kind(&self, name: &str) -> Result<&Kind, RepositoryError> {
        self.kinds
            .iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| RepositoryError::UnknownKind(name.to_owned()))
    }

    /// Kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.iter()
    }

    fn package_index(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name() == name)
    }

    // -- objects --------------------------------------------------------------

    /// Add a raw object document.
    pub fn add(&mut self, raw: Value) -> Result<&KindObject, RepositoryError> {
        if self.pending_validation {
            return Err(RepositoryError::PackagesNotValidated);
        }
        let obj = KindObject::from_value(raw)?;
        let objects = self
            .objects
            .get_mut(obj.kind())
            .ok_or_else(|| RepositoryError::UnknownKind(obj.kind().to_owned()))?;
        tracing::debug!(obj = %obj.ref_string(), "adding object");
        objects.add(obj)
    }

    /// Remove the object `kind/tag`.
    pub fn remove(&mut self, reference: &str) -> Result<KindObject, RepositoryError> {
        let Reference { kind, tag } = Reference::parse(reference)?;
        let tag = tag.ok_or_else(|| RepositoryError::InvalidReference(reference.to_owned()))?;
        self.objects_mut(&kind)?.remove(&tag)
    }

    /// Resolve `kind` to its collection or `kind/tag` to one object.
    pub fn get(&self, reference: &str) -> Result<Lookup<'_>, RepositoryError> {
        let Reference { kind, tag } = Reference::parse(reference)?;
        let objects = self.get_objects(&kind)?;
        match tag {
            None => Ok(Lookup::Kind(objects)),
            Some(tag) => objects.get(&tag).map(Lookup::Object),
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.get(reference).is_ok()
    }

    pub fn get_object(&self, kind: &str, tag: &str) -> Result<&KindObject, RepositoryError> {
        self.get_objects(kind)?.get(tag)
    }

    pub fn get_objects(&self, kind: &str) -> Result<&KindObjects, RepositoryError> {
        self.objects
            .get(kind)
            .ok_or_else(|| RepositoryError::UnknownKind(kind.to_owned()))
    }

    fn objects_mut(&mut self, kind: &str) -> Result<&mut KindObjects, RepositoryError> {
        self.objects
            .get_mut(kind)
            .ok_or_else(|| RepositoryError::UnknownKind(kind.to_owned()))
    }

    /// Write one field of a stored object.
    pub fn set_field(&mut self, reference: &str, name: &str, value: Value) -> Result<(), RepositoryError> {
        let Reference { kind, tag } = Reference::parse(reference)?;
        let tag = tag.ok_or_else(|| RepositoryError::InvalidReference(reference.to_owned()))?;
        self.objects_mut(&kind)?.get_mut(&tag)?.set(name, value)
    }

    /// Number of objects across all Kinds.
    pub fn len(&self) -> usize {
        self.objects.values().map(KindObjects::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every object, Kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &KindObject> {
        self.kinds
            .iter()
            .filter_map(|k| self.objects.get(k.name()))
            .flat_map(KindObjects::iter)
    }

    // -- queries --------------------------------------------------------------

    /// Lazily select objects of one Kind.
    pub fn select<'r>(
        &'r self,
        kind: &str,
        selector: &Selector,
    ) -> Result<Box<dyn Iterator<Item = &'r KindObject> + 'r>, RepositoryError> {
        self.get_objects(kind)?.select(selector)
    }

    /// Run every selector of `query`, materializing the results.
    pub fn query(&self, query: &Query) -> Result<QueryResult<'_>, RepositoryError> {
        let mut result = QueryResult::default();
        for (kind, selector) in query.iter() {
            let objs: Vec<&KindObject> = self.select(kind, selector)?.collect();
            tracing::debug!(kind, matched = objs.len(), "query");
            result.push(kind.to_owned(), objs);
        }
        Ok(result)
    }

    // -- tasks ----------------------------------------------------------------

    /// Invoke `pkg.Kind.task` on the object tagged `tag`.
    pub fn invoke(&self, task: &str, tag: &str, args: &TaskArgs) -> Result<TaskOutput, RepositoryError> {
        let task = TaskReference::parse(task)?;
        self.invoke_kind_task(task.kind(), tag, task.name(), args)
    }

    pub fn invoke_kind_task(
        &self,
        kind: &str,
        tag: &str,
        task: &str,
        args: &TaskArgs,
    ) -> Result<TaskOutput, RepositoryError> {
        let kind = self.get_kind(kind)?;
        let task = kind.tasks().get(task)?;
        let obj = self.get_object(kind.name(), tag)?;
        let time = Utc::now();
        let started = Instant::now();
        let result = task.invoke(obj.bind(self), args)?;
        Ok(TaskOutput {
            task: task.name(),
            obj: obj.ref_string(),
            time,
            duration: started.elapsed().as_secs_f64(),
            result,
        })
    }

    // -- documents ------------------------------------------------------------

    /// Add every package document, then validate.
    pub fn load_packages<I>(&mut self, docs: I) -> Result<usize, RepositoryError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut count = 0;
        for doc in docs {
            self.add_package(PackageDecl::from_value(doc)?)?;
            count += 1;
        }
        self.validate_packages()?;
        Ok(count)
    }

    /// Add every object document.
    pub fn load_objects<I>(&mut self, docs: I) -> Result<usize, RepositoryError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut count = 0;
        for doc in docs {
            self.add(doc)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn load_packages_file(&mut self, path: &Path) -> Result<usize, RepositoryError> {
        let count = self.load_packages(loader::read_documents(path)?)?;
        tracing::info!(path = %path.display(), packages = count, "loaded packages");
        Ok(count)
    }

    pub fn load_objects_file(&mut self, path: &Path) -> Result<usize, RepositoryError> {
        let count = self.load_objects(loader::read_documents(path)?)?;
        tracing::info!(path = %path.display(), objects = count, "loaded objects");
        Ok(count)
    }

    /// Every object as its Kind dumps it.
    pub fn dump(&self) -> Result<Vec<Value>, RepositoryError> {
        self.iter()
            .map(|obj| Ok(self.get_kind(obj.kind())?.dump(obj)))
            .collect()
    }

    /// Every package document.
    pub fn dump_packages(&self) -> Result<Vec<Value>, RepositoryError> {
        self.packages.iter().map(Package::to_value).collect()
    }
}
