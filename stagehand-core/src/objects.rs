//! The per-Kind object collection.

use std::collections::{HashMap, HashSet};

use crate::error::RepositoryError;
use crate::object::KindObject;
use crate::query::Selector;

/// Every object of one Kind: insertion order, a tag index and a label index.
#[derive(Debug, Clone, Default)]
pub struct KindObjects {
    kind: String,
    order: Vec<String>,
    items: HashMap<String, KindObject>,
    labels: HashMap<String, Vec<String>>,
}

impl KindObjects {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.items.contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Result<&KindObject, RepositoryError> {
        self.items.get(tag).ok_or_else(|| self.unknown(tag))
    }

    pub(crate) fn get_mut(&mut self, tag: &str) -> Result<&mut KindObject, RepositoryError> {
        let unknown = self.unknown(tag);
        self.items.get_mut(tag).ok_or(unknown)
    }

    /// Insert `obj`. Its tag must be new to this collection.
    pub fn add(&mut self, obj: KindObject) -> Result<&KindObject, RepositoryError> {
        let tag = obj.tag().to_owned();
        if self.items.contains_key(&tag) {
            return Err(RepositoryError::DuplicateObject(obj.ref_string()));
        }
        for label in obj.labels() {
            let bucket = self.labels.entry(label.clone()).or_default();
            if !bucket.contains(&tag) {
                bucket.push(tag.clone());
            }
        }
        self.order.push(tag.clone());
        Ok(self.items.entry(tag).or_insert(obj))
    }

    /// Remove by tag, dropping it from every label bucket.
    pub fn remove(&mut self, tag: &str) -> Result<KindObject, RepositoryError> {
        let obj = self.items.remove(tag).ok_or_else(|| self.unknown(tag))?;
        self.order.retain(|t| t != tag);
        for label in obj.labels() {
            if let Some(bucket) = self.labels.get_mut(label) {
                bucket.retain(|t| t != tag);
                if bucket.is_empty() {
                    self.labels.remove(label);
                }
            }
        }
        Ok(obj)
    }

    /// Objects in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KindObject> {
        self.order.iter().filter_map(|t| self.items.get(t))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Tags indexed under `label`, in insertion order.
    pub fn tagged(&self, label: &str) -> &[String] {
        self.labels.get(label).map_or(&[][..], Vec::as_slice)
    }

    /// Lazily select objects.
    ///
    /// `all` yields everything in insertion order. Otherwise tag matches come
    /// first in insertion order, then label matches in requested-label order,
    /// each object at most once.
    pub fn select<'a>(
        &'a self,
        selector: &Selector,
    ) -> Result<Box<dyn Iterator<Item = &'a KindObject> + 'a>, RepositoryError> {
        selector.check()?;
        if selector.all {
            return Ok(Box::new(self.iter()));
        }
        let wanted: HashSet<String> = selector.tags.iter().cloned().collect();
        let by_tag = self
            .order
            .iter()
            .filter(move |t| wanted.contains(t.as_str()))
            .map(String::as_str);
        let by_label = selector
            .labels
            .clone()
            .into_iter()
            .flat_map(move |label| self.tagged(&label).iter().map(String::as_str));
        let mut seen: HashSet<&'a str> = HashSet::new();
        Ok(Box::new(
            by_tag
                .chain(by_label)
                .filter(move |t| seen.insert(*t))
                .filter_map(move |t| self.items.get(t)),
        ))
    }

    fn unknown(&self, tag: &str) -> RepositoryError {
        RepositoryError::UnknownObject(format!("{}/{}", self.kind, tag))
    }
}
