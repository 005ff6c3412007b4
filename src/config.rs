/// Gallery configuration
///
/// Every field has a default, so a config file only needs the values it
/// changes. Without a file, data lives in the user's data directory:
/// - Linux: ~/.local/share/gallery
/// - macOS: ~/Library/Application Support/gallery
/// - Windows: %APPDATA%\gallery
/// and thumbnails in the matching cache directory.
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::index::store::DEFAULT_BATCH_THRESHOLD;
use crate::thumbnail::{PipelineSettings, DEFAULT_MEMORY_CAPACITY, THUMBNAIL_SIZE};

const APP_DIR_NAME: &str = "gallery";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GalleryConfig {
    /// Index files and the sort-state file
    pub data_dir: PathBuf,
    /// Thumbnail records
    pub cache_dir: PathBuf,
    /// Concurrent thumbnail decodes
    pub worker_threads: usize,
    /// Dirty pose-count mutations before an automatic write
    pub pose_flush_threshold: usize,
    /// Longest side of a cached thumbnail
    pub thumbnail_size: u32,
    /// Decoded images kept in memory
    pub memory_cache_entries: usize,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        let cache_dir = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("thumbnails");

        Self {
            data_dir,
            cache_dir,
            worker_threads: 2,
            pose_flush_threshold: DEFAULT_BATCH_THRESHOLD,
            thumbnail_size: THUMBNAIL_SIZE,
            memory_cache_entries: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl GalleryConfig {
    /// Keep everything under one directory
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            cache_dir: root.join("thumbnails"),
            ..Self::default()
        }
    }

    /// Read a JSON config file. Missing or malformed files give defaults.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No config at {} ({}), using defaults", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            cache_dir: self.cache_dir.clone(),
            worker_threads: self.worker_threads,
            max_side: self.thumbnail_size,
            memory_capacity: self.memory_cache_entries,
        }
    }
}
