//! Directory-of-JSON-entities store.
//!
//! One entity per file, written atomically (write temp, then rename).
//! [`PersistBase::init`] treats the directory as a self-healing cache:
//! unparseable files are removed (with a bounded retry loop) instead of
//! failing startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use hive_core::errors::{PersistOperation, Result, SwarmError};

/// Attempts to remove a corrupt file before giving up.
const REMOVE_RETRIES: usize = 3;

/// A flat directory of `<key>.json` entities.
#[derive(Clone, Debug)]
pub struct PersistBase {
    dir: PathBuf,
}

impl PersistBase {
    /// Create a store rooted at `dir`. Nothing touches the filesystem
    /// until [`PersistBase::init`] or the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store's directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entity_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Create the directory and drop every entity that no longer parses.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SwarmError::persist_io(PersistOperation::Init, &self.dir, &e))?;

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SwarmError::persist_io(PersistOperation::Init, &self.dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parses = fs::read_to_string(&path)
                .ok()
                .and_then(|data| serde_json::from_str::<serde_json::Value>(&data).ok())
                .is_some();
            if parses {
                continue;
            }
            warn!(path = %path.display(), "removing corrupt persisted entity");
            for attempt in 1..=REMOVE_RETRIES {
                match fs::remove_file(&path) {
                    Ok(()) => break,
                    Err(e) if attempt == REMOVE_RETRIES => {
                        warn!(path = %path.display(), error = %e, "corrupt entity could not be removed");
                    }
                    Err(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Read an entity. `Ok(None)` when the file does not exist.
    pub fn read_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.entity_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SwarmError::persist_io(PersistOperation::Read, &path, &e)),
        };
        let value = serde_json::from_str(&data).map_err(|e| SwarmError::Persistence {
            operation: PersistOperation::Read,
            path,
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Write an entity atomically: serialize to a temp file in the same
    /// directory, then rename over the target.
    pub fn write_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SwarmError::persist_io(PersistOperation::Write, &self.dir, &e))?;

        let path = self.entity_path(key);
        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));

        let json = serde_json::to_string(value).map_err(|e| SwarmError::Persistence {
            operation: PersistOperation::Write,
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&tmp, json)
            .map_err(|e| SwarmError::persist_io(PersistOperation::Write, &tmp, &e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| SwarmError::persist_io(PersistOperation::Write, &path, &e))?;
        debug!(path = %path.display(), "entity written");
        Ok(())
    }

    /// Whether an entity exists.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entity_path(key).is_file()
    }

    /// Remove an entity. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entity_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SwarmError::persist_io(PersistOperation::Remove, &path, &e)),
        }
    }

    /// Keys of all entities, unsorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwarmError::persist_io(PersistOperation::Read, &self.dir, &e)),
        };
        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_owned());
                }
            }
        }
        Ok(keys)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    fn store() -> (tempfile::TempDir, PersistBase) {
        let dir = tempfile::tempdir().unwrap();
        let base = PersistBase::new(dir.path().join("entities"));
        (dir, base)
    }

    #[test]
    fn write_then_read() {
        let (_dir, base) = store();
        let record = Record {
            name: "a".into(),
            count: 1,
        };
        base.write_value("k1", &record).unwrap();
        let back: Option<Record> = base.read_value("k1").unwrap();
        assert_eq!(back, Some(record));
    }

    #[test]
    fn read_missing_is_none() {
        let (_dir, base) = store();
        let back: Option<Record> = base.read_value("missing").unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn overwrite_replaces() {
        let (_dir, base) = store();
        base.write_value("k", &Record { name: "a".into(), count: 1 }).unwrap();
        base.write_value("k", &Record { name: "b".into(), count: 2 }).unwrap();
        let back: Record = base.read_value("k").unwrap().unwrap();
        assert_eq!(back.name, "b");
    }

    #[test]
    fn has_and_remove() {
        let (_dir, base) = store();
        base.write_value("k", &Record { name: "a".into(), count: 1 }).unwrap();
        assert!(base.has("k"));
        assert!(base.remove("k").unwrap());
        assert!(!base.has("k"));
        assert!(!base.remove("k").unwrap());
    }

    #[test]
    fn keys_lists_entities() {
        let (_dir, base) = store();
        base.write_value("a", &1u32).unwrap();
        base.write_value("b", &2u32).unwrap();
        let mut keys = base.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn keys_of_missing_dir_is_empty() {
        let (_dir, base) = store();
        assert!(base.keys().unwrap().is_empty());
    }

    #[test]
    fn init_removes_corrupt_entities() {
        let (_dir, base) = store();
        base.write_value("good", &Record { name: "a".into(), count: 1 }).unwrap();
        std::fs::write(base.dir().join("bad.json"), "{not json").unwrap();

        base.init().unwrap();
        assert!(base.has("good"));
        assert!(!base.has("bad"));
    }

    #[test]
    fn init_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = PersistBase::new(dir.path().join("nested/deep"));
        base.init().unwrap();
        assert!(base.dir().is_dir());
    }

    #[test]
    fn no_temp_files_left_after_write() {
        let (_dir, base) = store();
        base.write_value("k", &1u32).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(base.dir())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
