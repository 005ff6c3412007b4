/// Multi-context sorting
///
/// This module handles:
/// - Sort types, directions and per-context validity (engine.rs)
/// - Stateless in-place comparators over any `Sortable` entry (engine.rs)
/// - The persisted per-context sort preference (cache.rs)

pub mod engine;
pub mod cache;

pub use cache::SortStateCache;
pub use engine::{
    compare_names, sort_entries, sort_entries_with, SortContext, SortDirection, SortState,
    SortType, Sortable,
};
