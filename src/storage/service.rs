//! Upload store: the operations exposed to adapters.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::archive::{Archiver, CompactOutcome};
use super::compaction::{CompactionReport, CompactionScheduler};
use super::inventory::{Inventory, InventoryListing};
use super::lock::UploadLock;
use super::sandbox::{PathSandbox, SandboxedPath};
use super::tree::{TreeWriter, UploadBatch};
use super::{
    archive_path, check_plain_name, is_hidden, is_lock_marker, ARCHIVE_EXTENSION,
    DEFAULT_FOLDER_SIZE_CEILING, DEFAULT_PREVIEW_MAX_BYTES,
};
use crate::{PackratError, Result};

/// How a batch was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Loose files directly under the root.
    Flat,
    /// A folder tree, compacted into an archive.
    Folder,
}

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Flat or folder upload.
    pub mode: UploadMode,
    /// Folder name, or the first file name for flat uploads.
    pub name: String,
    /// Number of files written.
    pub file_count: usize,
}

/// The upload engine over one uploads root.
#[derive(Debug, Clone)]
pub struct UploadStore {
    sandbox: PathSandbox,
    lock: UploadLock,
    archiver: Archiver,
    size_ceiling: u64,
    preview_max_bytes: u64,
}

impl UploadStore {
    /// Open a store, creating the uploads root if it doesn't exist.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let sandbox = PathSandbox::new(root)?;
        let root = sandbox.root().to_path_buf();

        Ok(Self {
            lock: UploadLock::new(&root),
            archiver: Archiver::new(&root),
            sandbox,
            size_ceiling: DEFAULT_FOLDER_SIZE_CEILING,
            preview_max_bytes: DEFAULT_PREVIEW_MAX_BYTES,
        })
    }

    /// Set the folder size ceiling and preview limit.
    pub fn with_limits(mut self, size_ceiling: u64, preview_max_bytes: u64) -> Self {
        self.size_ceiling = size_ceiling;
        self.preview_max_bytes = preview_max_bytes;
        self
    }

    /// Get the canonical uploads root.
    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    /// Store an upload batch.
    ///
    /// Flat batches are written directly under the root. Folder batches are
    /// written under their shared root name while its upload lock is held,
    /// then archived and removed before the lock is released. Every path is
    /// validated before anything is written; a failing step stops the
    /// remaining ones without undoing earlier ones.
    pub fn ingest(&self, batch: &UploadBatch) -> Result<UploadResult> {
        let writer = TreeWriter::new(self.sandbox.clone());
        let plan = writer.plan(batch)?;

        let Some(folder) = plan.root_name().map(str::to_string) else {
            let report = writer.execute(&plan)?;
            let name = batch
                .entries()
                .first()
                .and_then(|e| e.relative_path.rsplit(['/', '\\']).next())
                .unwrap_or_default()
                .to_string();
            tracing::info!(name = %name, files = report.written, "Flat upload stored");
            return Ok(UploadResult {
                mode: UploadMode::Flat,
                name,
                file_count: report.written,
            });
        };

        let guard = self.lock.guard(&folder)?;
        let report = writer.execute(&plan)?;
        // A re-upload always gets a fresh archive rather than the leftover fast path
        let entries = self.archiver.archive_and_remove(&folder)?;
        guard.release()?;

        tracing::info!(
            folder = %folder,
            files = report.written,
            entries,
            "Folder upload stored and archived"
        );
        Ok(UploadResult {
            mode: UploadMode::Folder,
            name: folder,
            file_count: report.written,
        })
    }

    /// Read a stored file.
    ///
    /// One segment addresses a loose file under the root, two segments
    /// address `folder/file` inside a not yet compacted folder.
    pub fn fetch_file(&self, segments: &[&str]) -> Result<Vec<u8>> {
        let path = self.resolve_file(segments)?;
        read_existing(path.as_path(), || format!("file {}", segments.join("/")))
    }

    /// Read the archive of a compacted folder.
    pub fn fetch_archive(&self, folder: &str) -> Result<Vec<u8>> {
        let path = self.archive_file(folder)?;
        read_existing(&path, || format!("archive {folder}"))
    }

    /// Path of the archive of a compacted folder, if it exists.
    pub fn archive_file(&self, folder: &str) -> Result<PathBuf> {
        check_plain_name(folder)?;
        let path = archive_path(self.root(), folder);
        if path.is_file() {
            Ok(path)
        } else {
            Err(PackratError::NotFound(format!("archive {folder}")))
        }
    }

    /// Delete a loose file under the root.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve_file(&[name])?;
        match fs::remove_file(path.as_path()) {
            Ok(()) => {
                tracing::info!(name, "File deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(PackratError::NotFound(format!("file {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a folder together with its archive.
    ///
    /// Refused while the folder's upload lock is held.
    pub fn delete_folder(&self, name: &str) -> Result<()> {
        check_plain_name(name)?;
        if is_hidden(name) {
            return Err(PackratError::NotFound(format!("folder {name}")));
        }
        if self.lock.is_held(name) {
            return Err(PackratError::Locked(name.to_string()));
        }

        let folder_dir = self.sandbox.resolve(name)?;
        let archive = archive_path(self.root(), name);
        let mut removed = false;

        if folder_dir.as_path().is_dir() {
            fs::remove_dir_all(folder_dir.as_path())?;
            removed = true;
        }
        if archive.is_file() {
            fs::remove_file(&archive)?;
            removed = true;
        }

        if removed {
            tracing::info!(folder = name, "Folder deleted");
            Ok(())
        } else {
            Err(PackratError::NotFound(format!("folder {name}")))
        }
    }

    /// Delete every top-level entry that is not protected by an upload lock.
    ///
    /// Locked folders, their lock markers and their archives are kept, as are
    /// hidden entries. Returns the number of entries removed.
    pub fn delete_all(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(self.root())?.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_hidden(&name) || is_lock_marker(&name) || self.is_protected(&name) {
                continue;
            }

            let path = entry.path();
            let result = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(removed, "Uploads root purged");
        Ok(removed)
    }

    /// List the uploads root.
    pub fn list_inventory(&self, detailed: bool) -> Result<InventoryListing> {
        Inventory::new(self.root())
            .with_size_ceiling(self.size_ceiling)
            .list(detailed)
    }

    /// Read a stored file as text for previewing.
    ///
    /// Uses the same addressing as [`fetch_file`](Self::fetch_file). Files
    /// above the preview limit fail with [`PackratError::TooLarge`]; invalid
    /// UTF-8 is replaced.
    pub fn preview_text(&self, segments: &[&str]) -> Result<String> {
        let path = self.resolve_file(segments)?;
        let metadata = fs::metadata(path.as_path()).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                PackratError::NotFound(format!("file {}", segments.join("/")))
            }
            _ => e.into(),
        })?;

        if metadata.len() > self.preview_max_bytes {
            return Err(PackratError::TooLarge {
                size: metadata.len(),
                limit: self.preview_max_bytes,
            });
        }

        let content = read_existing(path.as_path(), || format!("file {}", segments.join("/")))?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Run a compaction sweep over every folder.
    pub fn compact_all(&self) -> Result<CompactionReport> {
        CompactionScheduler::new(self.root()).compact_all()
    }

    /// Compact a single folder on demand.
    pub fn compact_folder(&self, name: &str) -> Result<CompactOutcome> {
        check_plain_name(name)?;
        if self.lock.is_held(name) {
            return Err(PackratError::Locked(name.to_string()));
        }
        self.archiver.compact(name)
    }

    /// Whether the upload lock for `name` is held.
    pub fn is_locked(&self, name: &str) -> bool {
        self.lock.is_held(name)
    }

    /// Whether a root entry belongs to a folder under construction.
    fn is_protected(&self, name: &str) -> bool {
        let folder = name
            .strip_suffix(ARCHIVE_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .unwrap_or(name);
        self.lock.is_held(folder)
    }

    fn resolve_file(&self, segments: &[&str]) -> Result<SandboxedPath> {
        if segments.is_empty() || segments.len() > 2 {
            return Err(PackratError::Validation(format!(
                "expected one or two path segments, got {}",
                segments.len()
            )));
        }
        for segment in segments {
            check_plain_name(segment)?;
            if is_hidden(segment) || is_lock_marker(segment) {
                return Err(PackratError::NotFound(format!("file {}", segments.join("/"))));
            }
        }

        let path = self.sandbox.resolve(&segments.join("/"))?;
        if path.as_path().is_dir() {
            return Err(PackratError::NotFound(format!("file {}", segments.join("/"))));
        }
        Ok(path)
    }
}

fn read_existing(path: &Path, what: impl FnOnce() -> String) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PackratError::NotFound(what())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UploadEntry;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, UploadStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    fn batch(entries: &[(&str, &str)]) -> UploadBatch {
        UploadBatch::new(
            entries
                .iter()
                .map(|(path, content)| UploadEntry::new(*path, content.as_bytes()))
                .collect(),
        )
    }

    #[test]
    fn test_open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("uploads");

        let store = UploadStore::open(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root.canonicalize().unwrap());
    }

    #[test]
    fn test_ingest_flat() {
        let (_temp_dir, store) = setup_store();

        let result = store
            .ingest(&batch(&[("report.pdf", "pdf"), ("notes.txt", "notes")]))
            .unwrap();

        assert_eq!(result.mode, UploadMode::Flat);
        assert_eq!(result.name, "report.pdf");
        assert_eq!(result.file_count, 2);
        assert_eq!(store.fetch_file(&["notes.txt"]).unwrap(), b"notes");
    }

    #[test]
    fn test_ingest_folder_archives_and_unlocks() {
        let (temp_dir, store) = setup_store();

        let result = store
            .ingest(&batch(&[("docs/a.txt", "hello"), ("docs/sub/b.txt", "world")]))
            .unwrap();

        assert_eq!(result.mode, UploadMode::Folder);
        assert_eq!(result.name, "docs");
        assert_eq!(result.file_count, 2);
        assert!(!temp_dir.path().join("docs").exists());
        assert!(!store.is_locked("docs"));
        assert!(!store.fetch_archive("docs").unwrap().is_empty());
    }

    #[test]
    fn test_ingest_partial_failure_releases_lock() {
        let (temp_dir, store) = setup_store();

        let result = store.ingest(&batch(&[("docs/a.txt", "a"), ("docs/a.txt/b.txt", "b")]));

        assert!(matches!(result, Err(PackratError::PartialWrite { written: 1, .. })));
        assert!(!store.is_locked("docs"));
        // Written files stay, nothing was archived
        assert!(temp_dir.path().join("docs").join("a.txt").is_file());
        assert!(!temp_dir.path().join("docs.zip").exists());
    }

    #[test]
    fn test_fetch_file_in_folder() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs").join("a.txt"), "a").unwrap();

        assert_eq!(store.fetch_file(&["docs", "a.txt"]).unwrap(), b"a");
    }

    #[test]
    fn test_fetch_file_errors() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();

        assert!(matches!(store.fetch_file(&["missing.txt"]), Err(PackratError::NotFound(_))));
        assert!(matches!(store.fetch_file(&["docs"]), Err(PackratError::NotFound(_))));
        assert!(matches!(store.fetch_file(&[".."]), Err(PackratError::Validation(_))));
        assert!(matches!(store.fetch_file(&[]), Err(PackratError::Validation(_))));
        assert!(matches!(
            store.fetch_file(&["a", "b", "c"]),
            Err(PackratError::Validation(_))
        ));
    }

    #[test]
    fn test_fetch_file_hides_markers() {
        let (temp_dir, store) = setup_store();
        fs::write(temp_dir.path().join("docs.uploading"), "").unwrap();

        assert!(matches!(
            store.fetch_file(&["docs.uploading"]),
            Err(PackratError::NotFound(_))
        ));
    }

    #[test]
    fn test_fetch_archive_missing() {
        let (_temp_dir, store) = setup_store();
        let result = store.fetch_archive("docs");
        assert!(matches!(result, Err(PackratError::NotFound(ref m)) if m == "archive docs"));
    }

    #[test]
    fn test_delete_file() {
        let (_temp_dir, store) = setup_store();
        store.ingest(&batch(&[("a.txt", "a")])).unwrap();

        store.delete_file("a.txt").unwrap();

        assert!(matches!(store.fetch_file(&["a.txt"]), Err(PackratError::NotFound(_))));
        assert!(matches!(store.delete_file("a.txt"), Err(PackratError::NotFound(_))));
    }

    #[test]
    fn test_delete_folder_removes_archive() {
        let (temp_dir, store) = setup_store();
        store.ingest(&batch(&[("docs/a.txt", "a")])).unwrap();

        store.delete_folder("docs").unwrap();

        assert!(!temp_dir.path().join("docs.zip").exists());
        assert!(matches!(store.delete_folder("docs"), Err(PackratError::NotFound(_))));
    }

    #[test]
    fn test_delete_folder_refuses_locked() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        UploadLock::new(temp_dir.path()).acquire("docs").unwrap();

        let result = store.delete_folder("docs");

        assert!(matches!(result, Err(PackratError::Locked(_))));
        assert!(temp_dir.path().join("docs").is_dir());
    }

    #[test]
    fn test_delete_all_keeps_locked_folder() {
        let (temp_dir, store) = setup_store();
        store.ingest(&batch(&[("a.txt", "a")])).unwrap();
        store.ingest(&batch(&[("docs/a.txt", "a")])).unwrap();
        fs::create_dir(temp_dir.path().join("busy")).unwrap();
        fs::write(temp_dir.path().join("busy.zip"), "old").unwrap();
        UploadLock::new(temp_dir.path()).acquire("busy").unwrap();

        let removed = store.delete_all().unwrap();

        assert_eq!(removed, 2);
        assert!(temp_dir.path().join("busy").is_dir());
        assert!(temp_dir.path().join("busy.zip").is_file());
        assert!(temp_dir.path().join("busy.uploading").is_file());
        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(!temp_dir.path().join("docs.zip").exists());
    }

    #[test]
    fn test_preview_text() {
        let (_temp_dir, store) = setup_store();
        store.ingest(&batch(&[("notes.txt", "line one\nline two")])).unwrap();

        assert_eq!(store.preview_text(&["notes.txt"]).unwrap(), "line one\nline two");
    }

    #[test]
    fn test_preview_text_too_large() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::open(temp_dir.path()).unwrap().with_limits(1024, 4);
        fs::write(temp_dir.path().join("big.txt"), "12345").unwrap();

        let result = store.preview_text(&["big.txt"]);

        assert!(matches!(result, Err(PackratError::TooLarge { size: 5, limit: 4 })));
    }

    #[test]
    fn test_preview_text_lossy() {
        let (temp_dir, store) = setup_store();
        fs::write(temp_dir.path().join("bin.dat"), [b'o', b'k', 0xff]).unwrap();

        assert_eq!(store.preview_text(&["bin.dat"]).unwrap(), "ok\u{fffd}");
    }

    #[test]
    fn test_compact_folder() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs").join("a.txt"), "a").unwrap();

        assert_eq!(
            store.compact_folder("docs").unwrap(),
            CompactOutcome::Archived { entries: 1 }
        );

        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        assert_eq!(store.compact_folder("docs").unwrap(), CompactOutcome::Removed);
    }

    #[test]
    fn test_compact_folder_refuses_locked() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        UploadLock::new(temp_dir.path()).acquire("docs").unwrap();

        assert!(matches!(store.compact_folder("docs"), Err(PackratError::Locked(_))));
    }

    #[test]
    fn test_list_inventory_detailed() {
        let (temp_dir, store) = setup_store();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs").join("a.txt"), "abc").unwrap();

        let listing = store.list_inventory(true).unwrap();

        assert_eq!(listing.folders.len(), 1);
        assert_eq!(listing.folders[0].size, Some(3));
    }
}
