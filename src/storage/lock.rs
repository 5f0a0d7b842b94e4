//! Upload lock markers.
//!
//! A folder is locked while `{root}/{folder}.uploading` exists. There is no
//! in-memory lock table: a crashed process leaves its marker behind and the
//! folder stays locked until the marker is removed by hand.

use std::fs;
use std::io;
use std::path::PathBuf;

use super::{check_plain_name, lock_path};
use crate::Result;

/// Marker-file lock for folders under construction.
#[derive(Debug, Clone)]
pub struct UploadLock {
    root: PathBuf,
}

impl UploadLock {
    /// Create a lock manager for the given uploads root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the marker for `folder`.
    pub fn marker_path(&self, folder: &str) -> PathBuf {
        lock_path(&self.root, folder)
    }

    /// Create the marker for `folder`.
    ///
    /// Acquiring an already-held lock is not an error. The marker records
    /// when it was written so stale locks can be spotted by hand.
    pub fn acquire(&self, folder: &str) -> Result<()> {
        check_plain_name(folder)?;
        let stamp = chrono::Utc::now().to_rfc3339();
        fs::write(self.marker_path(folder), stamp)?;
        tracing::debug!(folder, "Upload lock acquired");
        Ok(())
    }

    /// Remove the marker for `folder`.
    ///
    /// Releasing a lock that is not held is not an error.
    pub fn release(&self, folder: &str) -> Result<()> {
        check_plain_name(folder)?;
        match fs::remove_file(self.marker_path(folder)) {
            Ok(()) => {
                tracing::debug!(folder, "Upload lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether the marker for `folder` exists.
    pub fn is_held(&self, folder: &str) -> bool {
        check_plain_name(folder).is_ok() && self.marker_path(folder).exists()
    }

    /// Acquire the lock and return a guard that releases it when dropped.
    pub fn guard(&self, folder: &str) -> Result<UploadLockGuard> {
        self.acquire(folder)?;
        Ok(UploadLockGuard {
            lock: self.clone(),
            folder: folder.to_string(),
            released: false,
        })
    }
}

/// Held upload lock, released on drop.
///
/// Only an orderly drop releases the marker; if the process dies the marker
/// stays on disk.
#[derive(Debug)]
pub struct UploadLockGuard {
    lock: UploadLock,
    folder: String,
    released: bool,
}

impl UploadLockGuard {
    /// Name of the locked folder.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Release the lock now, reporting any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release(&self.folder)
    }
}

impl Drop for UploadLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release(&self.folder) {
            tracing::warn!(folder = %self.folder, error = %e, "Failed to release upload lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackratError;
    use tempfile::TempDir;

    fn setup_lock() -> (TempDir, UploadLock) {
        let temp_dir = TempDir::new().unwrap();
        let lock = UploadLock::new(temp_dir.path());
        (temp_dir, lock)
    }

    #[test]
    fn test_acquire_and_release() {
        let (temp_dir, lock) = setup_lock();

        assert!(!lock.is_held("docs"));
        lock.acquire("docs").unwrap();
        assert!(lock.is_held("docs"));
        assert!(temp_dir.path().join("docs.uploading").is_file());

        lock.release("docs").unwrap();
        assert!(!lock.is_held("docs"));
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (_temp_dir, lock) = setup_lock();

        lock.acquire("docs").unwrap();
        lock.acquire("docs").unwrap();

        assert!(lock.is_held("docs"));
    }

    #[test]
    fn test_release_is_idempotent() {
        let (_temp_dir, lock) = setup_lock();

        lock.release("docs").unwrap();
        lock.acquire("docs").unwrap();
        lock.release("docs").unwrap();
        lock.release("docs").unwrap();

        assert!(!lock.is_held("docs"));
    }

    #[test]
    fn test_locks_are_per_folder() {
        let (_temp_dir, lock) = setup_lock();

        lock.acquire("docs").unwrap();

        assert!(lock.is_held("docs"));
        assert!(!lock.is_held("photos"));
    }

    #[test]
    fn test_rejects_non_plain_names() {
        let (_temp_dir, lock) = setup_lock();

        assert!(matches!(
            lock.acquire("../outside"),
            Err(PackratError::Validation(_))
        ));
        assert!(!lock.is_held("../outside"));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (_temp_dir, lock) = setup_lock();

        {
            let guard = lock.guard("docs").unwrap();
            assert_eq!(guard.folder(), "docs");
            assert!(lock.is_held("docs"));
        }

        assert!(!lock.is_held("docs"));
    }

    #[test]
    fn test_guard_explicit_release() {
        let (_temp_dir, lock) = setup_lock();

        let guard = lock.guard("docs").unwrap();
        guard.release().unwrap();

        assert!(!lock.is_held("docs"));
    }

    #[test]
    fn test_marker_survives_forget() {
        let (_temp_dir, lock) = setup_lock();

        // Simulates a crash: the guard never runs its destructor
        std::mem::forget(lock.guard("docs").unwrap());

        assert!(lock.is_held("docs"));
    }
}
