//! Path sandboxing for client-supplied relative paths.
//!
//! Every path that comes from a client goes through [`PathSandbox::resolve`]
//! before anything touches the disk.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::{PackratError, Result};

/// A root directory that untrusted relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    /// Canonical root directory.
    root: PathBuf,
}

/// A path guaranteed to be a strict descendant of its sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedPath {
    path: PathBuf,
    relative: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox rooted at an existing directory.
    ///
    /// The root is canonicalized once here; [`resolve`](Self::resolve) itself
    /// never touches the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    /// Create a sandbox rooted at a directory inside this one.
    ///
    /// The directory does not need to exist yet.
    pub fn nested(&self, dir: &SandboxedPath) -> PathSandbox {
        PathSandbox {
            root: dir.path.clone(),
        }
    }

    /// Get the canonical root of this sandbox.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted relative path against the root.
    ///
    /// Leading separators are stripped, `\` is treated as a separator, empty
    /// and `.` segments are dropped and `..` pops a segment. Anything that
    /// would climb above the root, names the root itself, or carries a
    /// platform prefix fails with [`PackratError::PathEscape`].
    pub fn resolve(&self, untrusted: &str) -> Result<SandboxedPath> {
        let escape = || PackratError::PathEscape(untrusted.to_string());

        if untrusted.contains('\0') {
            return Err(escape());
        }

        let normalized = untrusted.replace('\\', "/");
        let mut segments: Vec<&str> = Vec::new();

        for segment in normalized.trim_start_matches('/').split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop().ok_or_else(escape)?;
                }
                name => {
                    // A segment must be a plain name on this platform (no `C:` prefixes)
                    let mut components = Path::new(name).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => segments.push(name),
                        _ => return Err(escape()),
                    }
                }
            }
        }

        if segments.is_empty() {
            return Err(escape());
        }

        let relative: PathBuf = segments.iter().collect();
        let path = self.root.join(&relative);

        if !path.starts_with(&self.root) || path == self.root {
            return Err(escape());
        }

        Ok(SandboxedPath { path, relative })
    }
}

impl SandboxedPath {
    /// Full path on disk.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the sandbox root, normalized.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Consume and return the full path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for SandboxedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SandboxedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
