use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::content::normalize_key;
use crate::error::Result;
use crate::persist::write_atomic;

/// A value that can live in a persisted index.
///
/// Every value domain has an "empty" sentinel (rating 0, count <= 0, no
/// tags). Empty values are never stored: setting one removes the key.
pub trait IndexValue: Clone + PartialEq {
    /// True for the domain's "nothing here" value
    fn is_empty_value(&self) -> bool;

    /// Encode for the JSON index file
    fn to_json(&self) -> Value;

    /// Decode from the JSON index file; `None` rejects the entry
    fn from_json(value: &Value) -> Option<Self>;
}

/// Integer indices (ratings, counts) are stored as decimal strings
impl IndexValue for i64 {
    fn is_empty_value(&self) -> bool {
        *self <= 0
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

/// When dirty mutations reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistPolicy {
    /// Write synchronously on every change
    Immediate,
    /// Write once `threshold` dirty mutations have accumulated, or on flush
    Batched { threshold: usize },
}

/// Default batch size for write-heavy indices
pub const DEFAULT_BATCH_THRESHOLD: usize = 200;

/// Persisted key -> value index backed by one JSON object on disk.
///
/// The file is read lazily on first access, not at construction. Keys are
/// normalised with `normalize_key` at every boundary so lookups are
/// case-insensitive. The store is owned by the interactive thread and is not
/// synchronised.
pub struct IndexStore<V: IndexValue> {
    path: PathBuf,
    policy: PersistPolicy,
    entries: OnceCell<HashMap<String, V>>,
    /// Mutations not yet persisted
    dirty: usize,
}

impl<V: IndexValue> IndexStore<V> {
    pub fn new(path: impl Into<PathBuf>, policy: PersistPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            entries: OnceCell::new(),
            dirty: 0,
        }
    }

    /// Path of the backing JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> PersistPolicy {
        self.policy
    }

    /// Look up a value. `None` if the key is unknown or holds the empty value.
    pub fn try_get(&self, uid: &str) -> Option<&V> {
        self.entries()
            .get(&normalize_key(uid))
            .filter(|v| !v.is_empty_value())
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.try_get(uid).is_some()
    }

    /// Set a value in memory and schedule persistence per the policy.
    ///
    /// Returns true if the stored value changed. Writing the value already
    /// stored is a no-op and does not mark the store dirty.
    pub fn set(&mut self, uid: &str, value: V) -> bool {
        let key = normalize_key(uid);
        let entries = self.entries_mut();

        let changed = if value.is_empty_value() {
            entries.remove(&key).is_some()
        } else {
            match entries.get(&key) {
                Some(existing) if *existing == value => false,
                _ => {
                    entries.insert(key, value);
                    true
                }
            }
        };

        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Remove a key entirely. Returns true if it existed.
    pub fn remove(&mut self, uid: &str) -> bool {
        let key = normalize_key(uid);
        let removed = self.entries_mut().remove(&key).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// True while mutations are waiting to be written (including after a failed write)
    pub fn is_dirty(&self) -> bool {
        self.dirty > 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries().keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries().iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Persist pending mutations now.
    ///
    /// Failures are logged and the store stays dirty so the next attempt retries.
    pub fn flush(&mut self) {
        if self.dirty == 0 {
            return;
        }

        match self.save() {
            Ok(()) => {
                debug!(
                    "Saved {} entries ({} mutations) to {}",
                    self.len(),
                    self.dirty,
                    self.path.display()
                );
                self.dirty = 0;
            }
            Err(e) => {
                error!("Failed to save index {}: {}", self.path.display(), e);
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty += 1;
        match self.policy {
            PersistPolicy::Immediate => self.flush(),
            PersistPolicy::Batched { threshold } => {
                if self.dirty >= threshold {
                    self.flush();
                }
            }
        }
    }

    fn entries(&self) -> &HashMap<String, V> {
        self.entries.get_or_init(|| load_entries(&self.path))
    }

    fn entries_mut(&mut self) -> &mut HashMap<String, V> {
        if self.entries.get().is_none() {
            self.entries = OnceCell::from(load_entries(&self.path));
        }
        self.entries
            .get_mut()
            .expect("index entries are initialised above")
    }

    fn save(&self) -> Result<()> {
        let object: Map<String, Value> = self
            .entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        let json = serde_json::to_string_pretty(&Value::Object(object))?;
        write_atomic(&self.path, json.as_bytes())
    }
}

impl<V: IndexValue> Drop for IndexStore<V> {
    fn drop(&mut self) {
        // Batched mutations below the threshold would otherwise be lost
        self.flush();
    }
}

impl<V: IndexValue> std::fmt::Debug for IndexStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("loaded", &self.entries.get().is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Read an index file. A missing or unreadable file is an empty index;
/// the file itself is never touched here.
fn load_entries<V: IndexValue>(path: &Path) -> HashMap<String, V> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No index at {}, starting empty", path.display());
            return HashMap::new();
        }
        Err(e) => {
            warn!("Failed to read index {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let object: Map<String, Value> = match serde_json::from_str(&text) {
        Ok(object) => object,
        Err(e) => {
            error!(
                "Failed to parse index {}: {} (file left untouched)",
                path.display(),
                e
            );
            return HashMap::new();
        }
    };

    let mut entries = HashMap::with_capacity(object.len());
    for (key, raw) in &object {
        match V::from_json(raw) {
            Some(value) if !value.is_empty_value() => {
                entries.insert(normalize_key(key), value);
            }
            Some(_) => {}
            None => warn!("Skipping invalid value for '{}' in {}", key, path.display()),
        }
    }

    info!("Loaded {} entries from {}", entries.len(), path.display());
    entries
}
