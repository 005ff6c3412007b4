use std::path::Path;

use super::store::{IndexStore, PersistPolicy};

/// Number of people in each pose asset, keyed by content UID.
///
/// Counts are filled in as poses are inspected, which is write-heavy and
/// cheap to redo, so writes are batched.
#[derive(Debug)]
pub struct PoseCountIndex {
    store: IndexStore<i64>,
}

impl PoseCountIndex {
    pub const FILE_NAME: &'static str = "pose_people.json";

    pub fn open(data_dir: &Path, flush_threshold: usize) -> Self {
        let policy = PersistPolicy::Batched {
            threshold: flush_threshold.max(1),
        };
        Self {
            store: IndexStore::new(data_dir.join(Self::FILE_NAME), policy),
        }
    }

    /// The stored people count, `None` when unknown
    pub fn try_get(&self, uid: &str) -> Option<u32> {
        self.store
            .try_get(uid)
            .map(|&n| u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// The stored people count, 0 when unknown
    pub fn count(&self, uid: &str) -> u32 {
        self.try_get(uid).unwrap_or(0)
    }

    /// Record a people count; values <= 0 forget the entry
    pub fn set_count(&mut self, uid: &str, count: i64) -> bool {
        self.store.set(uid, count)
    }

    pub fn flush(&mut self) {
        self.store.flush();
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
