//! Persistent key-value store.
//!
//! Values live in namespaces (`Agent\Parameters`, `EventLog\Application\Agent`);
//! the storage technology is behind [`KeyValueStore`]. The registry
//! backend lives in `svckeep-platform`; this module provides an in-memory
//! store and a JSON file store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Namespace separator.
pub const SEPARATOR: char = '\\';

/// Joins namespace segments with [`SEPARATOR`].
#[must_use]
pub fn namespace(segments: &[&str]) -> String {
    let mut joined = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            joined.push(SEPARATOR);
        }
        joined.push_str(segment);
    }
    joined
}

/// A typed stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StoreValue {
    /// Plain string.
    String(String),
    /// String with unexpanded environment references.
    ExpandString(String),
    /// 32-bit number.
    Dword(u32),
}

impl StoreValue {
    /// Returns the text of a string value (plain or expandable).
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::ExpandString(s) => Some(s),
            Self::Dword(_) => None,
        }
    }

    /// Name of the value type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::ExpandString(_) => "expand_string",
            Self::Dword(_) => "dword",
        }
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::ExpandString(s) => f.write_str(s),
            Self::Dword(n) => write!(f, "{n}"),
        }
    }
}

/// Generic persistent key-value store.
///
/// Implementations acquire and release their native handles inside each
/// call, so no handle outlives an operation even on failure.
pub trait KeyValueStore: Send + Sync {
    /// Writes `value` under `key` in `namespace`, creating the namespace if
    /// needed and overwriting any prior value.
    fn write(&self, namespace: &str, key: &str, value: &StoreValue) -> StoreResult<()>;

    /// Reads a value. `Ok(None)` if the namespace or key is absent.
    fn read(&self, namespace: &str, key: &str) -> StoreResult<Option<StoreValue>>;

    /// Number of values directly in `namespace`. `Ok(None)` if absent.
    fn value_count(&self, namespace: &str) -> StoreResult<Option<usize>>;

    /// Removes a single value, leaving the namespace and its other values.
    /// Returns `Ok(false)` if the namespace or key was absent.
    fn remove_value(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    /// Removes `namespace` and everything below it.
    /// Returns `Ok(false)` if it did not exist.
    fn remove_namespace(&self, namespace: &str) -> StoreResult<bool>;
}

type Namespaces = BTreeMap<String, BTreeMap<String, StoreValue>>;

// An emptied namespace is dropped so it does not linger in the document.
fn remove_entry(namespaces: &mut Namespaces, namespace: &str, key: &str) -> bool {
    let Some(values) = namespaces.get_mut(namespace) else {
        return false;
    };
    let removed = values.remove(key).is_some();
    if values.is_empty() {
        namespaces.remove(namespace);
    }
    removed
}

fn remove_tree(namespaces: &mut Namespaces, namespace: &str) -> bool {
    let prefix = format!("{namespace}{SEPARATOR}");
    let before = namespaces.len();
    namespaces.retain(|name, _| name != namespace && !name.starts_with(&prefix));
    namespaces.len() != before
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<Namespaces>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of one namespace, for inspection.
    #[must_use]
    pub fn snapshot(&self, namespace: &str) -> Option<BTreeMap<String, StoreValue>> {
        self.namespaces.read().get(namespace).cloned()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn write(&self, namespace: &str, key: &str, value: &StoreValue) -> StoreResult<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn read(&self, namespace: &str, key: &str) -> StoreResult<Option<StoreValue>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|values| values.get(key))
            .cloned())
    }

    fn value_count(&self, namespace: &str) -> StoreResult<Option<usize>> {
        Ok(self.namespaces.read().get(namespace).map(BTreeMap::len))
    }

    fn remove_value(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        Ok(remove_entry(&mut self.namespaces.write(), namespace, key))
    }

    fn remove_namespace(&self, namespace: &str) -> StoreResult<bool> {
        Ok(remove_tree(&mut self.namespaces.write(), namespace))
    }
}

/// Store persisted as a single JSON document.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Opens (lazily) the store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<Namespaces> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Namespaces::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Namespaces::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, namespaces: &Namespaces) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(namespaces)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn write(&self, namespace: &str, key: &str, value: &StoreValue) -> StoreResult<()> {
        let _guard = self.lock.write();
        let mut namespaces = self.load()?;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        self.save(&namespaces)
    }

    fn read(&self, namespace: &str, key: &str) -> StoreResult<Option<StoreValue>> {
        let _guard = self.lock.read();
        let mut namespaces = self.load()?;
        Ok(namespaces
            .get_mut(namespace)
            .and_then(|values| values.remove(key)))
    }

    fn value_count(&self, namespace: &str) -> StoreResult<Option<usize>> {
        let _guard = self.lock.read();
        Ok(self.load()?.get(namespace).map(BTreeMap::len))
    }

    fn remove_value(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let _guard = self.lock.write();
        let mut namespaces = self.load()?;
        let removed = remove_entry(&mut namespaces, namespace, key);
        if removed {
            self.save(&namespaces)?;
        }
        Ok(removed)
    }

    fn remove_namespace(&self, namespace: &str) -> StoreResult<bool> {
        let _guard = self.lock.write();
        let mut namespaces = self.load()?;
        let removed = remove_tree(&mut namespaces, namespace);
        if removed {
            self.save(&namespaces)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "svckeep-store-{}-{}.json",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn test_namespace_join() {
        assert_eq!(namespace(&["Agent", "Parameters"]), "Agent\\Parameters");
        assert_eq!(namespace(&["Agent"]), "Agent");
        assert_eq!(namespace(&[]), "");
    }

    #[test]
    fn test_memory_store_overwrite_and_count() {
        let store = MemoryStore::new();
        store
            .write("a", "k", &StoreValue::String("1".into()))
            .unwrap();
        store
            .write("a", "k", &StoreValue::String("2".into()))
            .unwrap();
        assert_eq!(store.value_count("a").unwrap(), Some(1));
        assert_eq!(
            store.read("a", "k").unwrap(),
            Some(StoreValue::String("2".into()))
        );
        assert_eq!(store.value_count("missing").unwrap(), None);
        assert_eq!(store.read("missing", "k").unwrap(), None);
    }

    #[test]
    fn test_remove_namespace_is_recursive() {
        let store = MemoryStore::new();
        store.write("svc", "Description", &StoreValue::String("d".into())).unwrap();
        store
            .write("svc\\Parameters", "Param1", &StoreValue::String("-c".into()))
            .unwrap();
        store.write("svc2", "x", &StoreValue::Dword(1)).unwrap();

        assert!(store.remove_namespace("svc").unwrap());
        assert_eq!(store.value_count("svc\\Parameters").unwrap(), None);
        assert_eq!(store.value_count("svc2").unwrap(), Some(1));
        assert!(!store.remove_namespace("svc").unwrap());
    }

    #[test]
    fn test_remove_value_keeps_siblings() {
        let store = MemoryStore::new();
        store.write("svc", "Description", &StoreValue::String("d".into())).unwrap();
        store.write("svc", "ImagePath", &StoreValue::String("agent.exe".into())).unwrap();

        assert!(store.remove_value("svc", "Description").unwrap());
        assert!(!store.remove_value("svc", "Description").unwrap());
        assert_eq!(store.value_count("svc").unwrap(), Some(1));

        assert!(store.remove_value("svc", "ImagePath").unwrap());
        assert_eq!(store.value_count("svc").unwrap(), None);
        assert!(!store.remove_value("missing", "k").unwrap());
    }

    #[test]
    fn test_store_value_accessors() {
        assert_eq!(StoreValue::ExpandString("%X%".into()).as_str(), Some("%X%"));
        assert_eq!(StoreValue::Dword(7).as_str(), None);
        assert_eq!(StoreValue::Dword(7).type_name(), "dword");
        assert_eq!(StoreValue::Dword(7).to_string(), "7");
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let path = temp_path("persist");
        let _ = std::fs::remove_file(&path);

        {
            let store = FileStore::new(&path);
            store
                .write("svc\\Parameters", "Param1", &StoreValue::String("-c".into()))
                .unwrap();
            store
                .write("EventLog\\Application\\svc", "TypesSupported", &StoreValue::Dword(7))
                .unwrap();
        }

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.read("svc\\Parameters", "Param1").unwrap(),
            Some(StoreValue::String("-c".into()))
        );
        assert_eq!(
            reopened
                .read("EventLog\\Application\\svc", "TypesSupported")
                .unwrap(),
            Some(StoreValue::Dword(7))
        );

        assert!(reopened.remove_namespace("svc").unwrap());
        assert_eq!(reopened.value_count("svc\\Parameters").unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);
        let store = FileStore::new(&path);
        assert_eq!(store.value_count("anything").unwrap(), None);
        assert!(!store.remove_namespace("anything").unwrap());
    }

    #[test]
    fn test_file_store_corrupt_document() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(
            store.read("a", "b"),
            Err(StoreError::Serialization(_))
        ));
        let _ = std::fs::remove_file(&path);
    }
}
