use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use super::SchemaError;
use super::model::CompiledSchema;

struct Entry {
    modified: Option<SystemTime>,
    compiled: Mutex<Option<Arc<CompiledSchema>>>,
}

/// Compiled schemas shared across validation calls.
///
/// Keyed by canonical path and modification time of the root schema file, so
/// an edited schema is recompiled on its next use. Lookups take a read lock;
/// the first caller for an entry compiles while concurrent callers for the
/// same entry wait on its slot. Failed compilations are not cached.
#[derive(Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<PathBuf, Arc<Entry>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled schema for `path`, compiling it on first use.
    pub fn get(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledSchema>, SchemaError> {
        let path = path.as_ref();
        let unavailable = |source| SchemaError::Unavailable {
            path: path.to_path_buf(),
            source,
        };
        let key = fs::canonicalize(path).map_err(unavailable)?;
        let modified = fs::metadata(&key).map_err(unavailable)?.modified().ok();

        let entry = self.entry(key.clone(), modified);
        let mut slot = entry.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(schema) = slot.as_ref() {
            return Ok(Arc::clone(schema));
        }
        tracing::info!(schema = %key.display(), "compiling XML schema");
        let schema = Arc::new(CompiledSchema::load(&key)?);
        *slot = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Validate `xml` against the cached schema at `path`.
    pub fn validate(&self, xml: &[u8], path: impl AsRef<Path>) -> Result<(), SchemaError> {
        self.get(path)?.validate(xml)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn entry(&self, key: PathBuf, modified: Option<SystemTime>) -> Arc<Entry> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key).filter(|e| e.modified == modified) {
                return Arc::clone(entry);
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&key) {
            Some(entry) if entry.modified == modified => Arc::clone(entry),
            _ => {
                let entry = Arc::new(Entry {
                    modified,
                    compiled: Mutex::new(None),
                });
                entries.insert(key, Arc::clone(&entry));
                entry
            }
        }
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .finish()
    }
}
