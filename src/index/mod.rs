/// Persisted metadata indices
///
/// This module handles the per-entry metadata the gallery stores:
/// - A generic lazily-loaded JSON key -> value store (store.rs)
/// - User ratings, 0-5 stars (ratings.rs)
/// - Free-text user tags (tags.rs)
/// - Pose people counts (pose.rs)

pub mod store;
pub mod ratings;
pub mod tags;
pub mod pose;

pub use pose::PoseCountIndex;
pub use ratings::RatingIndex;
pub use store::{IndexStore, IndexValue, PersistPolicy};
pub use tags::{TagIndex, TagSet};
