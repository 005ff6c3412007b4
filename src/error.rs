/// Crate-wide error type
///
/// Most public operations never surface these: persistence failures are
/// logged and degrade to defaults. They flow through the internal load/save
/// paths so that the logging happens in one place.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Corrupt record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("No valid sort type for context '{context}'")]
    NoValidSortType { context: String },
}

impl GalleryError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GalleryError::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
