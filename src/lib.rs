//! Content gallery pipeline for a scene-authoring tool.
//!
//! - `index`: lazily loaded, dirty-tracked JSON indices (ratings, tags, pose counts)
//! - `sort`: multi-context sort engine and the persisted per-context preference
//! - `thumbnail`: prioritised background decode with memory and disk caches
//! - `gallery`: the service that owns all of the above

pub mod config;
pub mod content;
pub mod error;
pub mod gallery;
pub mod index;
pub mod persist;
pub mod sort;
pub mod thumbnail;

pub use config::GalleryConfig;
pub use content::{content_uid, scan_folder, CategoryEntry, ContentEntry};
pub use error::{GalleryError, Result};
pub use gallery::Gallery;
