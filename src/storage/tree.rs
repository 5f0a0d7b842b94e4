//! Reconstruction of uploaded folder trees under the uploads root.

use std::fs;
use std::path::{Path, PathBuf};

use super::sandbox::{PathSandbox, SandboxedPath};
use super::{is_hidden, is_lock_marker, lock_path, ARCHIVE_EXTENSION};
use crate::{PackratError, Result};

/// One file of an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Client-supplied relative path (untrusted).
    pub relative_path: String,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadEntry {
    /// Create a new upload entry.
    pub fn new(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }

    /// Path segments with separators normalized and empty / `.` segments dropped.
    fn segments(&self) -> Vec<&str> {
        self.relative_path
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect()
    }
}

/// Files submitted together in one upload request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadBatch {
    entries: Vec<UploadEntry>,
}

impl UploadBatch {
    /// Create a batch from its entries, keeping their order.
    pub fn new(entries: Vec<UploadEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: UploadEntry) {
        self.entries.push(entry);
    }

    /// Entries in submission order.
    pub fn entries(&self) -> &[UploadEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared top-level folder name of the batch.
    ///
    /// Taken from the first entry whose path has a directory component.
    /// `None` means a flat multi-file upload.
    pub fn root_name(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| {
            let segments = entry.segments();
            if segments.len() > 1 {
                Some(segments[0])
            } else {
                None
            }
        })
    }
}

/// Outcome of a successful batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Shared folder name, `None` for a flat upload.
    pub root_name: Option<String>,
    /// Directory the batch was written into.
    pub destination: PathBuf,
    /// Number of files written.
    pub written: usize,
}

/// Validated write plan for a batch.
///
/// Every target is already sandboxed, so executing the plan cannot write
/// outside the uploads root.
#[derive(Debug)]
pub struct WritePlan<'a> {
    root_name: Option<String>,
    destination: PathBuf,
    targets: Vec<(SandboxedPath, &'a UploadEntry)>,
}

impl WritePlan<'_> {
    /// Shared folder name, `None` for a flat upload.
    pub fn root_name(&self) -> Option<&str> {
        self.root_name.as_deref()
    }

    /// Directory the batch will be written into.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Number of files in the plan.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Writes upload batches into the uploads root.
#[derive(Debug, Clone)]
pub struct TreeWriter {
    sandbox: PathSandbox,
}

impl TreeWriter {
    /// Create a writer for the given uploads root sandbox.
    pub fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    /// Resolve every entry of a batch without writing anything.
    ///
    /// Folder uploads go to `{root}/{root_name}` with a leading
    /// `{root_name}/` stripped from each entry when present. Flat uploads keep
    /// only each entry's basename and go directly under the root.
    pub fn plan<'a>(&self, batch: &'a UploadBatch) -> Result<WritePlan<'a>> {
        if batch.is_empty() {
            return Err(PackratError::Validation("upload batch is empty".to_string()));
        }

        match batch.root_name() {
            Some(root_name) => self.plan_folder(batch, root_name),
            None => self.plan_flat(batch),
        }
    }

    fn plan_folder<'a>(&self, batch: &'a UploadBatch, root_name: &str) -> Result<WritePlan<'a>> {
        let folder = self.sandbox.resolve(root_name).map_err(|_| {
            let offending = batch
                .entries()
                .iter()
                .find(|e| e.segments().first() == Some(&root_name))
                .map_or(root_name, |e| e.relative_path.as_str());
            PackratError::PathEscape(offending.to_string())
        })?;
        if is_hidden(root_name) || is_lock_marker(root_name) {
            return Err(PackratError::Validation(format!(
                "folder name not allowed: {root_name}"
            )));
        }

        let folder_sandbox = self.sandbox.nested(&folder);
        let mut targets = Vec::with_capacity(batch.len());

        for entry in batch.entries() {
            let segments = entry.segments();
            let inner = match segments.split_first() {
                Some((first, rest)) if *first == root_name && !rest.is_empty() => rest,
                _ => &segments[..],
            };

            let target = folder_sandbox.resolve(&inner.join("/")).map_err(|_| {
                PackratError::PathEscape(entry.relative_path.clone())
            })?;
            targets.push((target, entry));
        }

        Ok(WritePlan {
            root_name: Some(root_name.to_string()),
            destination: folder.into_path_buf(),
            targets,
        })
    }

    fn plan_flat<'a>(&self, batch: &'a UploadBatch) -> Result<WritePlan<'a>> {
        let mut targets = Vec::with_capacity(batch.len());

        for entry in batch.entries() {
            let basename = entry.segments().last().copied().unwrap_or_default();
            let target = self
                .sandbox
                .resolve(basename)
                .map_err(|_| PackratError::PathEscape(entry.relative_path.clone()))?;

            if is_hidden(basename) || is_lock_marker(basename) {
                return Err(PackratError::Validation(format!(
                    "file name not allowed: {basename}"
                )));
            }
            if target.as_path().is_dir() {
                return Err(PackratError::Validation(format!(
                    "a folder named {basename} already exists"
                )));
            }
            // Only the archiver may create the archive marker of a folder
            if let Some(folder) = self.archived_folder(basename) {
                return Err(PackratError::Validation(format!(
                    "{basename} is the archive name of folder {folder}"
                )));
            }
            targets.push((target, entry));
        }

        Ok(WritePlan {
            root_name: None,
            destination: self.sandbox.root().to_path_buf(),
            targets,
        })
    }

    /// Folder whose archive marker `name` would be, if that folder exists or
    /// is being uploaded.
    fn archived_folder<'n>(&self, name: &'n str) -> Option<&'n str> {
        let folder = name
            .strip_suffix(ARCHIVE_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())?;
        let root = self.sandbox.root();
        (root.join(folder).is_dir() || lock_path(root, folder).exists()).then_some(folder)
    }

    /// Execute a plan, creating intermediate directories as needed.
    ///
    /// Not transactional: on the first failing file, files written so far
    /// stay on disk and [`PackratError::PartialWrite`] reports how many.
    pub fn execute(&self, plan: &WritePlan<'_>) -> Result<WriteReport> {
        let mut written = 0;

        for (target, entry) in &plan.targets {
            if let Err(source) = write_file(target.as_path(), &entry.content) {
                tracing::warn!(
                    path = %entry.relative_path,
                    written,
                    error = %source,
                    "Upload write failed"
                );
                return Err(PackratError::PartialWrite {
                    written,
                    failed: entry.relative_path.clone(),
                    source,
                });
            }
            written += 1;
        }

        Ok(WriteReport {
            root_name: plan.root_name.clone(),
            destination: plan.destination.clone(),
            written,
        })
    }

    /// Plan and execute a batch in one step.
    pub fn write(&self, batch: &UploadBatch) -> Result<WriteReport> {
        let plan = self.plan(batch)?;
        self.execute(&plan)
    }
}

fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_writer() -> (TempDir, TreeWriter) {
        let temp_dir = TempDir::new().unwrap();
        let sandbox = PathSandbox::new(temp_dir.path()).unwrap();
        (temp_dir, TreeWriter::new(sandbox))
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
    fn test_root_name_folder() {
        let b = batch(&[("docs/a.txt", "a"), ("docs/sub/b.txt", "b")]);
        assert_eq!(b.root_name(), Some("docs"));
    }

    #[test]
    fn test_root_name_flat() {
        let b = batch(&[("a.txt", "a"), ("b.txt", "b")]);
        assert_eq!(b.root_name(), None);
    }

    #[test]
    fn test_root_name_ignores_leading_and_dot_segments() {
        let b = batch(&[("./a.txt", "a"), ("/photos//x.jpg", "x")]);
        assert_eq!(b.root_name(), Some("photos"));

        let b = batch(&[("docs\\a.txt", "a")]);
        assert_eq!(b.root_name(), Some("docs"));
    }

    #[test]
    fn test_write_folder() {
        let (temp_dir, writer) = setup_writer();
        let b = batch(&[("docs/a.txt", "hello"), ("docs/sub/b.txt", "world")]);

        let report = writer.write(&b).unwrap();

        assert_eq!(report.root_name.as_deref(), Some("docs"));
        assert_eq!(report.written, 2);
        let docs = temp_dir.path().join("docs");
        assert_eq!(fs::read_to_string(docs.join("a.txt")).unwrap(), "hello");
        assert_eq!(
            fs::read_to_string(docs.join("sub").join("b.txt")).unwrap(),
            "world"
        );
    }

    #[test]
    fn test_write_folder_tolerates_missing_root_prefix() {
        let (temp_dir, writer) = setup_writer();
        let b = batch(&[("docs/a.txt", "a"), ("extra.txt", "x")]);

        writer.write(&b).unwrap();

        assert!(temp_dir.path().join("docs").join("extra.txt").exists());
        assert!(!temp_dir.path().join("extra.txt").exists());
    }

    #[test]
    fn test_write_flat_uses_basename() {
        let (temp_dir, writer) = setup_writer();
        let b = batch(&[("report.pdf", "pdf")]);

        let report = writer.write(&b).unwrap();

        assert_eq!(report.root_name, None);
        assert_eq!(report.written, 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("report.pdf")).unwrap(),
            "pdf"
        );
    }

    #[test]
    fn test_write_flat_overwrites() {
        let (temp_dir, writer) = setup_writer();

        writer.write(&batch(&[("notes.txt", "old")])).unwrap();
        writer.write(&batch(&[("notes.txt", "new")])).unwrap();

        assert_eq!(
            fs::read_to_string(temp_dir.path().join("notes.txt")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_flat_rejects_archive_name_of_existing_folder() {
        let (temp_dir, writer) = setup_writer();
        fs::create_dir_all(temp_dir.path().join("photos")).unwrap();
        fs::write(temp_dir.path().join("photos/only_copy.jpg"), "jpeg").unwrap();

        let result = writer.write(&batch(&[("photos.zip", "not a zip")]));

        assert!(matches!(result, Err(PackratError::Validation(_))));
        assert!(!temp_dir.path().join("photos.zip").exists());
    }

    #[test]
    fn test_flat_rejects_archive_name_of_locked_folder() {
        let (temp_dir, writer) = setup_writer();
        fs::write(temp_dir.path().join("incoming.uploading"), "").unwrap();

        let result = writer.write(&batch(&[("incoming.zip", "junk")]));

        assert!(matches!(result, Err(PackratError::Validation(_))));
        assert!(!temp_dir.path().join("incoming.zip").exists());
    }

    #[test]
    fn test_flat_allows_zip_without_folder() {
        let (temp_dir, writer) = setup_writer();

        writer.write(&batch(&[("backup.zip", "zip")])).unwrap();

        assert!(temp_dir.path().join("backup.zip").is_file());
    }

    #[test]
    fn test_plan_rejects_escape_without_side_effects() {
        let (temp_dir, writer) = setup_writer();
        let b = batch(&[("docs/a.txt", "ok"), ("../../etc/passwd", "evil")]);

        let result = writer.write(&b);

        assert!(matches!(result, Err(PackratError::PathEscape(ref p)) if p == "../../etc/passwd"));
        assert!(!temp_dir.path().join("docs").exists());
    }

    #[test]
    fn test_plan_rejects_escape_as_root_name() {
        let (temp_dir, writer) = setup_writer();
        let b = batch(&[("../../etc/passwd", "evil")]);

        let result = writer.write(&b);

        assert!(matches!(result, Err(PackratError::PathEscape(ref p)) if p == "../../etc/passwd"));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_plan_rejects_escape_inside_folder() {
        let (_temp_dir, writer) = setup_writer();
        let b = batch(&[("docs/../../outside.txt", "evil")]);

        assert!(matches!(writer.plan(&b), Err(PackratError::PathEscape(_))));
    }

    #[test]
    fn test_plan_rejects_empty_batch() {
        let (_temp_dir, writer) = setup_writer();
        let empty = UploadBatch::default();
        let result = writer.plan(&empty);
        assert!(matches!(result, Err(PackratError::Validation(_))));
    }

    #[test]
    fn test_plan_rejects_marker_names() {
        let (_temp_dir, writer) = setup_writer();

        let b = batch(&[("docs.uploading", "x")]);
        let result = writer.plan(&b);
        assert!(matches!(result, Err(PackratError::Validation(_))));

        let b = batch(&[(".git/config", "x")]);
        let result = writer.plan(&b);
        assert!(matches!(result, Err(PackratError::Validation(_))));
    }

    #[test]
    fn test_plan_flat_rejects_existing_folder_name() {
        let (temp_dir, writer) = setup_writer();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();

        let b = batch(&[("docs", "x")]);
        let result = writer.plan(&b);
        assert!(matches!(result, Err(PackratError::Validation(_))));
    }

    #[test]
    fn test_execute_partial_failure_keeps_written_files() {
        let (temp_dir, writer) = setup_writer();
        // A file where a directory is needed makes the second write fail
        let b = batch(&[
            ("docs/a.txt", "a"),
            ("docs/a.txt/nested.txt", "b"),
            ("docs/c.txt", "c"),
        ]);

        let result = writer.write(&b);

        match result {
            Err(PackratError::PartialWrite { written, failed, .. }) => {
                assert_eq!(written, 1);
                assert_eq!(failed, "docs/a.txt/nested.txt");
            }
            other => panic!("Expected PartialWrite, got {other:?}"),
        }
        assert!(temp_dir.path().join("docs").join("a.txt").is_file());
        assert!(!temp_dir.path().join("docs").join("c.txt").exists());
    }

    #[test]
    fn test_binary_content() {
        let (temp_dir, writer) = setup_writer();
        let content: Vec<u8> = (0..=255).collect();
        let b = UploadBatch::new(vec![UploadEntry::new("bin/data.bin", content.clone())]);

        writer.write(&b).unwrap();

        let loaded = fs::read(temp_dir.path().join("bin").join("data.bin")).unwrap();
        assert_eq!(loaded, content);
    }
}
