use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::store::{IndexStore, IndexValue, PersistPolicy};
use crate::content::CategoryEntry;

/// Tags attached to one entry.
///
/// Comparison is case-insensitive; the casing a tag was first added with is
/// kept for display. Order of insertion is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.position(tag).is_some()
    }

    /// Add a tag; returns false if it (or a blank tag) was rejected
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        match self.position(tag) {
            Some(i) => {
                self.0.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn position(&self, tag: &str) -> Option<usize> {
        let needle = tag.trim().to_lowercase();
        self.0.iter().position(|t| t.to_lowercase() == needle)
    }
}

impl IndexValue for TagSet {
    fn is_empty_value(&self) -> bool {
        self.0.is_empty()
    }

    fn to_json(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::String).collect())
    }

    /// Accepts a JSON array, or a string holding a JSON-encoded array
    fn from_json(value: &Value) -> Option<Self> {
        let items = match value {
            Value::Array(items) => items.clone(),
            Value::String(s) => serde_json::from_str::<Vec<Value>>(s).ok()?,
            _ => return None,
        };

        let mut tags = TagSet::new();
        for item in items {
            tags.insert(item.as_str()?);
        }
        Some(tags)
    }
}

/// User tags keyed by content UID.
///
/// Tags are rare, user-authored and must never be lost, so every change is
/// written immediately. An entry whose last tag is removed is dropped from
/// the file instead of being stored as an empty array.
#[derive(Debug)]
pub struct TagIndex {
    store: IndexStore<TagSet>,
}

impl TagIndex {
    pub const FILE_NAME: &'static str = "tags.json";

    pub fn open(data_dir: &Path) -> Self {
        Self {
            store: IndexStore::new(data_dir.join(Self::FILE_NAME), PersistPolicy::Immediate),
        }
    }

    /// Tags for an entry, `None` when it has none
    pub fn try_get(&self, uid: &str) -> Option<&TagSet> {
        self.store.try_get(uid)
    }

    pub fn tags(&self, uid: &str) -> Vec<String> {
        self.try_get(uid)
            .map(|t| t.iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_tag(&self, uid: &str, tag: &str) -> bool {
        self.try_get(uid).is_some_and(|t| t.contains(tag))
    }

    pub fn add_tag(&mut self, uid: &str, tag: &str) -> bool {
        let mut tags = self.try_get(uid).cloned().unwrap_or_default();
        tags.insert(tag) && self.store.set(uid, tags)
    }

    pub fn remove_tag(&mut self, uid: &str, tag: &str) -> bool {
        let mut tags = match self.try_get(uid) {
            Some(tags) => tags.clone(),
            None => return false,
        };
        tags.remove(tag) && self.store.set(uid, tags)
    }

    /// Flip a tag; returns whether the entry has it afterwards
    pub fn toggle_tag(&mut self, uid: &str, tag: &str) -> bool {
        if self.has_tag(uid, tag) {
            self.remove_tag(uid, tag);
            false
        } else {
            self.add_tag(uid, tag)
        }
    }

    /// Every distinct tag with the number of entries carrying it, sorted by name
    pub fn all_tags(&self) -> Vec<CategoryEntry> {
        let mut uids: Vec<&str> = self.store.keys().collect();
        uids.sort_unstable();

        let mut counts: HashMap<String, CategoryEntry> = HashMap::new();
        for uid in uids {
            let Some(tags) = self.store.try_get(uid) else {
                continue;
            };
            for tag in tags.iter() {
                counts
                    .entry(tag.to_lowercase())
                    .or_insert_with(|| CategoryEntry::new(tag, 0))
                    .count += 1;
            }
        }

        let mut all: Vec<CategoryEntry> = counts.into_values().collect();
        all.sort_by_key(|c| c.name.to_lowercase());
        all
    }

    /// UIDs of every entry carrying `tag`, sorted
    pub fn uids_with_tag(&self, tag: &str) -> Vec<String> {
        let mut uids: Vec<String> = self
            .store
            .iter()
            .filter(|(_, tags)| tags.contains(tag))
            .map(|(uid, _)| uid.to_string())
            .collect();
        uids.sort();
        uids
    }

    pub fn flush(&mut self) {
        self.store.flush();
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }
}
