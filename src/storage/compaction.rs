//! Compaction sweep over the uploads root.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use super::archive::{Archiver, CompactOutcome};
use super::is_hidden;
use super::lock::UploadLock;
use crate::Result;

/// What happened to one folder during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FolderStatus {
    /// Folder was archived and removed.
    Compacted {
        /// Number of files stored in the archive.
        entries: usize,
    },
    /// Folder already had an archive; the leftover folder was removed.
    Removed,
    /// Folder was left alone.
    Skipped {
        /// Why the folder was skipped.
        reason: String,
    },
    /// Compacting the folder failed; it is left as it was.
    Error {
        /// Description of the failure.
        message: String,
    },
}

/// Sweep outcome for a single folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderOutcome {
    /// Folder name.
    pub name: String,
    /// What happened.
    #[serde(flatten)]
    pub status: FolderStatus,
}

/// Per-folder outcomes of a compaction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Outcomes in folder-name order.
    pub outcomes: Vec<FolderOutcome>,
}

impl CompactionReport {
    /// Outcome for the named folder, if the sweep saw it.
    pub fn get(&self, name: &str) -> Option<&FolderStatus> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.status)
    }

    /// Number of folders that were archived or cleaned up.
    pub fn compacted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    FolderStatus::Compacted { .. } | FolderStatus::Removed
                )
            })
            .count()
    }

    /// Number of folders that failed.
    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FolderStatus::Error { .. }))
            .count()
    }
}

/// Compacts every eligible folder under the uploads root.
///
/// Folders are processed one at a time. A folder with a held upload lock is
/// skipped and left untouched, and one folder's failure never stops the rest.
#[derive(Debug, Clone)]
pub struct CompactionScheduler {
    root: PathBuf,
    lock: UploadLock,
    archiver: Archiver,
}

impl CompactionScheduler {
    /// Create a scheduler over the given uploads root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            lock: UploadLock::new(&root),
            archiver: Archiver::new(&root),
            root,
        }
    }

    /// Run one sweep over the uploads root.
    ///
    /// Only listing the root itself can fail; per-folder failures are
    /// reported in the returned outcomes.
    pub fn compact_all(&self) -> Result<CompactionReport> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable root entry");
                    continue;
                }
            };
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_hidden(&name) => {}
                Ok(name) => names.push(name),
                Err(name) => {
                    tracing::warn!(name = ?name, "Skipping folder with non UTF-8 name");
                }
            }
        }
        names.sort();

        let mut report = CompactionReport::default();
        for name in names {
            let status = self.compact_one(&name);
            report.outcomes.push(FolderOutcome { name, status });
        }

        tracing::info!(
            folders = report.outcomes.len(),
            compacted = report.compacted_count(),
            errors = report.error_count(),
            "Compaction sweep finished"
        );
        Ok(report)
    }

    fn compact_one(&self, name: &str) -> FolderStatus {
        if self.lock.is_held(name) {
            tracing::info!(folder = name, "Skipping folder with upload in progress");
            return FolderStatus::Skipped {
                reason: "upload in progress".to_string(),
            };
        }

        match self.archiver.compact(name) {
            Ok(CompactOutcome::Archived { entries }) => FolderStatus::Compacted { entries },
            Ok(CompactOutcome::Removed) => FolderStatus::Removed,
            Err(e) => {
                tracing::warn!(folder = name, error = %e, "Folder compaction failed");
                FolderStatus::Error {
                    message: e.to_string(),
                }
            }
        }
    }
}
