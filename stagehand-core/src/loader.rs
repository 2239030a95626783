//! Reading YAML document streams from files and directory trees.
//!
//! A file may hold several `---`-separated documents. A document that is a
//! list contributes each of its items. Directories are walked recursively in
//! sorted order and only `*.yaml` / `*.yml` files are read from them.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{io_err, RepositoryError};

/// Every document under `path`, flattened.
pub fn read_documents(path: &Path) -> Result<Vec<Value>, RepositoryError> {
    let mut docs = Vec::new();
    for file in document_files(path)? {
        let text = std::fs::read_to_string(&file).map_err(|e| io_err(&file, e))?;
        let count = docs.len();
        parse_documents(&text, &file, &mut docs)?;
        tracing::debug!(path = %file.display(), documents = docs.len() - count, "read documents");
    }
    Ok(docs)
}

/// Parse one YAML stream, appending its documents to `out`.
pub fn parse_documents(text: &str, origin: &Path, out: &mut Vec<Value>) -> Result<(), RepositoryError> {
    for doc in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(doc).map_err(|source| RepositoryError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        match value {
            Value::Null => {}
            Value::Array(items) => out.extend(items),
            other => out.push(other),
        }
    }
    Ok(())
}

/// `path` itself, or every YAML file below it in sorted order.
pub fn document_files(path: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(RepositoryError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let mut files = Vec::new();
    walk(path, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), RepositoryError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            walk(&entry, files)?;
        } else if is_yaml(&entry) {
            files.push(entry);
        }
    }
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use serde_json::json;

    #[test]
    fn multi_document_files_and_lists_are_flattened() {
        let dir = assert_fs::TempDir::new().expect("tempdir");
        let file = dir.child("objects.yaml");
        file.write_str("- {kind: a.B, tag: x}\n- {kind: a.B, tag: y}\n---\nkind: a.B\ntag: z\n---\n")
            .expect("write");
        let docs = read_documents(file.path()).unwrap();
        let tags: Vec<_> = docs.iter().map(|d| d["tag"].clone()).collect();
        assert_eq!(tags, vec![json!("x"), json!("y"), json!("z")]);
    }

    #[test]
    fn directories_are_walked_in_sorted_order() {
        let dir = assert_fs::TempDir::new().expect("tempdir");
        dir.child("b.yaml").write_str("tag: b\n").expect("write");
        dir.child("a/z.yml").write_str("tag: az\n").expect("write");
        dir.child("c.yaml").write_str("tag: c\n").expect("write");
        dir.child("notes.txt").write_str("ignored").expect("write");
        let docs = read_documents(dir.path()).unwrap();
        let tags: Vec<_> = docs.iter().map(|d| d["tag"].clone()).collect();
        assert_eq!(tags, vec![json!("az"), json!("b"), json!("c")]);
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = assert_fs::TempDir::new().expect("tempdir");
        let err = read_documents(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn malformed_yaml_names_the_file() {
        let dir = assert_fs::TempDir::new().expect("tempdir");
        let file = dir.child("bad.yaml");
        file.write_str("kind: [unclosed\n").expect("write");
        let err = read_documents(file.path()).unwrap_err();
        assert!(matches!(err, RepositoryError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }
}
