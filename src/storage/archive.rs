//! Folder compaction into zip archives.
//!
//! The archive for `{root}/{folder}/` is `{root}/{folder}.zip`. It is built in
//! a hidden `.{folder}.zip.partial` file and renamed into place only after the
//! zip is finalized and synced, so an archive marker always names a complete
//! archive. The folder is removed only after that rename.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{archive_path, check_plain_name, lock_path, ARCHIVE_EXTENSION};
use crate::{PackratError, Result};

/// Result of compacting one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactOutcome {
    /// A new archive was written and the folder removed.
    Archived {
        /// Number of files stored in the archive.
        entries: usize,
    },
    /// An archive already existed; only the leftover folder was removed.
    Removed,
}

/// Packs folders under the uploads root into sibling zip archives.
#[derive(Debug, Clone)]
pub struct Archiver {
    root: PathBuf,
}

impl Archiver {
    /// Create an archiver for the given uploads root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Compact `folder`, reusing an existing archive if there is one.
    ///
    /// When `{folder}.zip` already exists the folder is treated as a leftover
    /// and deleted without re-archiving.
    pub fn compact(&self, folder: &str) -> Result<CompactOutcome> {
        check_plain_name(folder)?;
        let folder_dir = self.root.join(folder);
        if !folder_dir.is_dir() {
            return Err(PackratError::NotFound(format!("folder {folder}")));
        }

        if archive_path(&self.root, folder).is_file() {
            fs::remove_dir_all(&folder_dir)?;
            tracing::info!(folder, "Folder already archived, removed leftover copy");
            return Ok(CompactOutcome::Removed);
        }

        let entries = self.archive_and_remove(folder)?;
        Ok(CompactOutcome::Archived { entries })
    }

    /// Write a fresh archive for `folder` and then remove the folder.
    ///
    /// Any existing archive is replaced atomically. On failure the folder and
    /// the partial archive are both left on disk.
    pub fn archive_and_remove(&self, folder: &str) -> Result<usize> {
        check_plain_name(folder)?;
        let folder_dir = self.root.join(folder);
        if !folder_dir.is_dir() {
            return Err(PackratError::NotFound(format!("folder {folder}")));
        }

        let target = archive_path(&self.root, folder);
        let partial = self.partial_path(folder);
        let excluded = [
            target.clone(),
            partial.clone(),
            lock_path(&self.root, folder),
        ];

        let entries = write_archive(&folder_dir, &partial, &excluded).map_err(|e| {
            tracing::error!(folder, error = %e, "Archive creation failed");
            PackratError::archive(folder, e)
        })?;

        fs::rename(&partial, &target).map_err(|e| PackratError::archive(folder, e))?;
        tracing::info!(folder, entries, archive = %target.display(), "Folder archived");

        fs::remove_dir_all(&folder_dir)?;
        Ok(entries)
    }

    fn partial_path(&self, folder: &str) -> PathBuf {
        self.root
            .join(format!(".{folder}.{ARCHIVE_EXTENSION}.partial"))
    }
}

/// Stream every file under `dir` into a zip at `output`.
///
/// Entries are visited in file-name order so the same tree always yields the
/// same entry order. Symlinks are not followed.
fn write_archive(dir: &Path, output: &Path, excluded: &[PathBuf]) -> zip::result::ZipResult<usize> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || excluded.iter().any(|p| p == entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let name = archive_entry_name(relative);
        let large = entry.metadata().map_err(io::Error::from)?.len() >= u64::from(u32::MAX);

        zip.start_file(name, options.large_file(large))?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut zip)?;
        entries += 1;
    }

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(entries)
}

/// Zip entry name for a relative path, always `/`-separated.
fn archive_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
