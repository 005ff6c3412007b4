/// Content entries listed by the gallery
///
/// These structs represent the data model that flows between
/// the content lister, the sort engine and the metadata indices.
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::sort::Sortable;

/// Derive the stable, case-insensitive UID used to key every index.
///
/// Separators are normalised to `/` and the whole path is lower-cased, so
/// `Assets\Poses\Sit.JSON` and `assets/poses/sit.json` share one UID.
pub fn content_uid(path: impl AsRef<Path>) -> String {
    normalize_key(&path.as_ref().to_string_lossy())
}

/// Key normalisation applied at every store boundary
pub fn normalize_key(key: &str) -> String {
    key.trim().replace('\\', "/").to_lowercase()
}

/// A single file in the gallery
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEntry {
    /// Full path to the source file
    pub path: PathBuf,
    /// Filename shown in the grid (e.g., "Sit_Pose.json")
    pub display_name: String,
    /// Size on disk in bytes
    pub size: u64,
    /// Last write time of the source file
    pub modified: DateTime<Utc>,
}

impl ContentEntry {
    /// Build an entry from a path on disk; `None` if metadata can't be read
    pub fn from_path(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        let modified = meta.modified().ok().map(DateTime::<Utc>::from)?;
        let display_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Some(ContentEntry {
            path: path.to_path_buf(),
            display_name,
            size: meta.len(),
            modified,
        })
    }

    pub fn uid(&self) -> String {
        content_uid(&self.path)
    }
}

/// A named group with a member count (categories, creators, tags...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    pub name: String,
    pub count: u64,
}

impl CategoryEntry {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl Sortable for ContentEntry {
    fn sort_name(&self) -> &str {
        &self.display_name
    }

    fn sort_date(&self) -> i64 {
        self.modified.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }

    fn sort_size(&self) -> u64 {
        self.size
    }
}

impl Sortable for CategoryEntry {
    fn sort_name(&self) -> &str {
        &self.name
    }

    fn sort_count(&self) -> u64 {
        self.count
    }
}

/// List every file under `root` whose extension is in `extensions`.
///
/// Extension matching is case-insensitive and an empty list accepts every
/// file. Entries that can't be read are skipped.
pub fn scan_folder(root: &Path, extensions: &[&str], recursive: bool) -> Vec<ContentEntry> {
    debug!("Scanning folder: {}", root.display());

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        if !extensions.is_empty() {
            let ext = match path.extension() {
                Some(ext) => ext.to_string_lossy().to_lowercase(),
                None => continue,
            };
            if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                continue;
            }
        }

        if let Some(content) = ContentEntry::from_path(path) {
            entries.push(content);
        }
    }

    info!("Listed {} entries under {}", entries.len(), root.display());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_uid_is_case_and_separator_insensitive() {
        assert_eq!(
            content_uid("Assets\\Poses\\Sit.JSON"),
            content_uid("assets/poses/sit.json")
        );
        assert_eq!(normalize_key("  Foo/BAR "), "foo/bar");
    }

    #[test]
    fn test_scan_folder_filters_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.PNG"), b"1234").unwrap();
        fs::write(dir.path().join("b.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.png"), b"12").unwrap();

        let mut flat = scan_folder(dir.path(), &["png"], false);
        flat.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].display_name, "a.PNG");
        assert_eq!(flat[0].size, 4);

        let deep = scan_folder(dir.path(), &["png"], true);
        assert_eq!(deep.len(), 2);

        let all = scan_folder(dir.path(), &[], true);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_entry_uid_matches_path_uid() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Pose.json");
        fs::write(&file, b"{}").unwrap();

        let entry = ContentEntry::from_path(&file).unwrap();
        assert_eq!(entry.uid(), content_uid(&file));
    }
}
