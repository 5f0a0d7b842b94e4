//! Upload storage engine for packrat.
//!
//! Everything lives in a single uploads root:
//!
//! ```text
//! {uploads_root}/
//! ├── report.pdf          loose file (flat upload)
//! ├── photos/             folder upload, not yet compacted
//! ├── photos.uploading    lock marker while `photos/` is being written
//! └── docs.zip            archive marker for a compacted folder
//! ```
//!
//! The marker files are the only synchronization between uploads and
//! compaction. A folder whose lock marker exists is never compacted or
//! deleted, and a folder whose archive marker exists may be deleted.

mod archive;
mod compaction;
mod inventory;
mod lock;
mod sandbox;
mod service;
mod tree;

use std::path::{Path, PathBuf};

pub use archive::{Archiver, CompactOutcome};
pub use compaction::{CompactionReport, CompactionScheduler, FolderOutcome, FolderStatus};
pub use inventory::{folder_size, FileRecord, FolderRecord, Inventory, InventoryListing};
pub use lock::{UploadLock, UploadLockGuard};
pub use sandbox::{PathSandbox, SandboxedPath};
pub use service::{UploadMode, UploadResult, UploadStore};
pub use tree::{TreeWriter, UploadBatch, UploadEntry, WritePlan, WriteReport};

/// Extension of the archive marker written next to a compacted folder.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of the lock marker held while a folder is being written.
pub const LOCK_EXTENSION: &str = "uploading";

/// Default ceiling for folder size computation (1 GiB).
pub const DEFAULT_FOLDER_SIZE_CEILING: u64 = 1024 * 1024 * 1024;

/// Default ceiling for text previews (2 MiB).
pub const DEFAULT_PREVIEW_MAX_BYTES: u64 = 2 * 1024 * 1024;

/// Path of the archive marker for `folder` under `root`.
pub fn archive_path(root: &Path, folder: &str) -> PathBuf {
    root.join(format!("{folder}.{ARCHIVE_EXTENSION}"))
}

/// Path of the lock marker for `folder` under `root`.
pub fn lock_path(root: &Path, folder: &str) -> PathBuf {
    root.join(format!("{folder}.{LOCK_EXTENSION}"))
}

/// Check that `name` is a single plain path segment.
pub(crate) fn check_plain_name(name: &str) -> crate::Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(crate::PackratError::Validation(format!(
            "not a plain name: {name:?}"
        )))
    }
}

/// Whether a root entry name is hidden and must be left alone.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether a root entry name is a lock marker.
pub fn is_lock_marker(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == LOCK_EXTENSION)
}
