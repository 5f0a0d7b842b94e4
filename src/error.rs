//! Error types for packrat.

use thiserror::Error;

/// Common error type for packrat.
#[derive(Error, Debug)]
pub enum PackratError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An untrusted path resolved outside the uploads root.
    ///
    /// Always raised before anything touches the disk.
    #[error("path escapes the uploads root: {0}")]
    PathEscape(String),

    /// Some files of a batch were written, at least one failed.
    ///
    /// Files written before the failure are left on disk.
    #[error("partial write: {written} file(s) written, failed on {failed}: {source}")]
    PartialWrite {
        /// Number of files successfully written before the failure.
        written: usize,
        /// Relative path of the entry that failed.
        failed: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Archive creation failed; the source folder was left intact.
    #[error("failed to archive folder {folder}: {cause}")]
    Archive {
        /// Folder that was being archived.
        folder: String,
        /// Description of the underlying failure.
        cause: String,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Target exceeds a fixed size ceiling.
    #[error("{size} bytes exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed maximum in bytes.
        limit: u64,
    },

    /// Folder is locked by an in-flight upload.
    #[error("folder {0} is locked by an upload in progress")]
    Locked(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PackratError {
    /// Build an archive failure for `folder` from any displayable cause.
    pub fn archive(folder: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        PackratError::Archive {
            folder: folder.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for packrat operations.
pub type Result<T> = std::result::Result<T, PackratError>;
