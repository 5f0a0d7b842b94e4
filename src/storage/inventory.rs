//! Listing of the uploads root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{archive_path, is_hidden, is_lock_marker, lock_path, DEFAULT_FOLDER_SIZE_CEILING};
use crate::Result;

/// A loose file directly under the uploads root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Extension without the dot, if any.
    pub extension: Option<String>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Seconds since last modification.
    pub age_secs: i64,
}

/// A folder directly under the uploads root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderRecord {
    /// Folder name.
    pub name: String,
    /// Number of immediate children.
    pub child_count: usize,
    /// Whether `{name}.zip` exists next to the folder.
    pub archived: bool,
    /// Whether `{name}.uploading` exists next to the folder.
    pub locked: bool,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Seconds since last modification.
    pub age_secs: i64,
    /// Total size of all descendants, only for detailed listings.
    ///
    /// Capped: once the ceiling is passed counting stops early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Files and folders of the uploads root, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryListing {
    /// Loose files.
    pub files: Vec<FileRecord>,
    /// Folders.
    pub folders: Vec<FolderRecord>,
}

/// Read-only view over the uploads root.
#[derive(Debug, Clone)]
pub struct Inventory {
    root: PathBuf,
    size_ceiling: u64,
}

impl Inventory {
    /// Create an inventory over the given uploads root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            size_ceiling: DEFAULT_FOLDER_SIZE_CEILING,
        }
    }

    /// Set the folder size ceiling in bytes.
    pub fn with_size_ceiling(mut self, ceiling: u64) -> Self {
        self.size_ceiling = ceiling;
        self
    }

    /// List the uploads root.
    ///
    /// Folder sizes are only computed when `detailed` is set.
    pub fn list(&self, detailed: bool) -> Result<InventoryListing> {
        self.list_at(detailed, Utc::now())
    }

    /// List the uploads root, computing ages relative to `now`.
    pub fn list_at(&self, detailed: bool, now: DateTime<Utc>) -> Result<InventoryListing> {
        let mut listing = InventoryListing::default();

        for entry in fs::read_dir(&self.root)?.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_hidden(&name) {
                continue;
            }
            // Symlinks are not followed; the engine never creates them
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let modified = modified_time(metadata.modified().ok());
            let age_secs = (now - modified).num_seconds().max(0);

            if metadata.is_dir() {
                let child_count = fs::read_dir(entry.path())
                    .map(|children| children.count())
                    .unwrap_or(0);
                let size = detailed.then(|| folder_size(&entry.path(), self.size_ceiling));

                listing.folders.push(FolderRecord {
                    archived: archive_path(&self.root, &name).is_file(),
                    locked: lock_path(&self.root, &name).exists(),
                    name,
                    child_count,
                    modified,
                    age_secs,
                    size,
                });
            } else if metadata.is_file() && !is_lock_marker(&name) {
                let extension = Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase);

                listing.files.push(FileRecord {
                    name,
                    size: metadata.len(),
                    extension,
                    modified,
                    age_secs,
                });
            }
        }

        listing
            .files
            .sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        listing
            .folders
            .sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));

        Ok(listing)
    }
}

fn modified_time(time: Option<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_default()
}

/// Sum the sizes of all files under `dir`, stopping once `ceiling` is passed.
///
/// Walks with an explicit work stack. Unreadable subtrees are skipped, so the
/// result is a best-effort total; once the running total exceeds `ceiling`
/// the partial total is returned without visiting the remaining entries.
pub fn folder_size(dir: &Path, ceiling: u64) -> u64 {
    let mut total: u64 = 0;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(path = %current.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                total = total.saturating_add(entry.metadata().map(|m| m.len()).unwrap_or(0));
                if total > ceiling {
                    return total;
                }
            }
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_file(root: &Path, path: &str, content: &[u8]) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let listing = Inventory::new(temp_dir.path()).list(false).unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.folders.is_empty());
    }

    #[test]
    fn test_list_classifies_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_file(root, "report.PDF", b"12345");
        create_file(root, "docs/a.txt", b"a");
        create_file(root, "docs/sub/b.txt", b"b");
        create_file(root, "docs.zip", b"zip");
        create_file(root, "photos/x.jpg", b"x");
        create_file(root, "photos.uploading", b"");
        create_file(root, ".docs.zip.partial", b"");

        let listing = Inventory::new(root).list(false).unwrap();

        let mut file_names: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        file_names.sort();
        assert_eq!(file_names, vec!["docs.zip", "report.PDF"]);

        let report = listing.files.iter().find(|f| f.name == "report.PDF").unwrap();
        assert_eq!(report.size, 5);
        assert_eq!(report.extension.as_deref(), Some("pdf"));

        let docs = listing.folders.iter().find(|f| f.name == "docs").unwrap();
        assert_eq!(docs.child_count, 2);
        assert!(docs.archived);
        assert!(!docs.locked);
        assert_eq!(docs.size, None);

        let photos = listing.folders.iter().find(|f| f.name == "photos").unwrap();
        assert!(!photos.archived);
        assert!(photos.locked);
    }

    #[test]
    fn test_list_detailed_computes_size() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "docs/a.txt", &[0u8; 100]);
        create_file(temp_dir.path(), "docs/sub/b.txt", &[0u8; 50]);

        let listing = Inventory::new(temp_dir.path()).list(true).unwrap();

        assert_eq!(listing.folders[0].size, Some(150));
    }

    #[test]
    fn test_list_ages() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.txt", b"a");

        let later = Utc::now() + chrono::Duration::hours(1);
        let listing = Inventory::new(temp_dir.path())
            .list_at(false, later)
            .unwrap();

        assert!(listing.files[0].age_secs >= 3599);
    }

    #[test]
    fn test_folder_size_counts_all_descendants() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a/1.bin", &[1u8; 10]);
        create_file(temp_dir.path(), "a/b/2.bin", &[1u8; 20]);
        create_file(temp_dir.path(), "a/b/c/d/3.bin", &[1u8; 30]);

        assert_eq!(folder_size(temp_dir.path(), u64::MAX), 60);
    }

    #[test]
    fn test_folder_size_stops_at_ceiling() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..10 {
            create_file(temp_dir.path(), &format!("d{i}/f.bin"), &[0u8; 60]);
        }

        let size = folder_size(temp_dir.path(), 100);

        assert!(size >= 100);
        assert!(size < 600, "traversal should stop early, got {size}");
    }

    #[test]
    fn test_folder_size_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(folder_size(&temp_dir.path().join("missing"), 100), 0);
    }

    #[test]
    fn test_folder_size_deep_tree() {
        let temp_dir = TempDir::new().unwrap();
        let mut path = String::new();
        for _ in 0..200 {
            path.push_str("d/");
        }
        path.push_str("leaf.bin");
        create_file(temp_dir.path(), &path, &[0u8; 7]);

        assert_eq!(folder_size(temp_dir.path(), u64::MAX), 7);
    }
}
