use crate::errors::{StoreError, StoreResult};
use crate::store::Store;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filesystem-backed store with one file per key under a root directory.
///
/// Key segments are sanitised before touching the filesystem, so a key can
/// never escape the root. Writes go through a temporary file and an atomic
/// rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(sanitise_segment(segment));
        }
        path
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for_key(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for_key(key);
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Unavailable("store root has no parent".into()))?;
        fs::create_dir_all(parent).map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::Unavailable("empty key".into()))?
            .to_string_lossy();
        let tmp = path.with_file_name(format!("{file_name}.tmp"));
        let mut file =
            fs::File::create(&tmp).map_err(|err| StoreError::Unavailable(err.to_string()))?;
        file.write_all(value)
            .and_then(|_| file.sync_all())
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        fs::rename(&tmp, &path).map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for_key(key);
        match fs::remove_file(&path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut keys = Vec::new();
        collect_keys(&self.root, String::new(), &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, relative: String, keys: &mut Vec<String>) -> StoreResult<()> {
    let entries = fs::read_dir(dir).map_err(|err| StoreError::Unavailable(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let child = if relative.is_empty() {
            name
        } else {
            format!("{relative}/{name}")
        };
        let file_type = entry
            .file_type()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if file_type.is_dir() {
            collect_keys(&entry.path(), child, keys)?;
        } else if file_type.is_file() {
            keys.push(child);
        }
    }
    Ok(())
}

fn sanitise_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .replace("..", "__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("app/token", b"value").unwrap();
        assert_eq!(store.get("app/token").unwrap(), Some(b"value".to_vec()));

        store.delete("app/token").unwrap();
        assert!(store.get("app/token").unwrap().is_none());
        assert!(matches!(
            store.delete("app/token").unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn list_walks_nested_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("app/a", b"1").unwrap();
        store.set("app/sub/b", b"2").unwrap();
        store.set("other", b"3").unwrap();

        assert_eq!(
            store.list("app/").unwrap(),
            vec!["app/a".to_string(), "app/sub/b".to_string()]
        );
    }

    #[test]
    fn traversal_segments_stay_under_root() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("../escape", b"x").unwrap();
        assert!(dir.path().join("__").join("escape").exists());
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }
}
