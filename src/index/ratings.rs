use std::path::Path;

use super::store::{IndexStore, PersistPolicy};

/// Highest star rating
pub const MAX_RATING: u8 = 5;

/// User star ratings keyed by content UID.
///
/// Ratings are user-authored and rare, so every change is written immediately.
#[derive(Debug)]
pub struct RatingIndex {
    store: IndexStore<i64>,
}

impl RatingIndex {
    pub const FILE_NAME: &'static str = "ratings.json";

    /// Open (lazily) the ratings file inside `data_dir`
    pub fn open(data_dir: &Path) -> Self {
        Self {
            store: IndexStore::new(data_dir.join(Self::FILE_NAME), PersistPolicy::Immediate),
        }
    }

    /// The stored rating, `None` when unrated
    pub fn try_get(&self, uid: &str) -> Option<u8> {
        self.store.try_get(uid).map(|&r| clamp_rating(r))
    }

    /// The stored rating, 0 when unrated
    pub fn rating(&self, uid: &str) -> u8 {
        self.try_get(uid).unwrap_or(0)
    }

    /// Set a rating, clamped to 0..=5. A rating of 0 clears the entry.
    pub fn set_rating(&mut self, uid: &str, rating: i64) -> bool {
        self.store.set(uid, i64::from(clamp_rating(rating)))
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

fn clamp_rating(rating: i64) -> u8 {
    rating.clamp(0, i64::from(MAX_RATING)) as u8
}
