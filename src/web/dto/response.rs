//! Response DTOs for Web API.

use serde::Serialize;

use crate::storage::CompactOutcome;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Text preview of a stored file.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    /// Path of the previewed file.
    pub name: String,
    /// File content, invalid UTF-8 replaced.
    pub content: String,
}

/// Result of a single-target delete.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Name of the deleted file or folder.
    pub deleted: String,
}

/// Result of purging the uploads root.
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    /// Number of top-level entries removed.
    pub removed: usize,
}

/// Result of compacting a single folder.
#[derive(Debug, Serialize)]
pub struct FolderCompactResponse {
    /// Folder name.
    pub name: String,
    /// `compacted` or `removed`.
    pub status: &'static str,
    /// Number of archived files, for `compacted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
}

impl FolderCompactResponse {
    /// Build the response for a compaction outcome.
    pub fn new(name: impl Into<String>, outcome: CompactOutcome) -> Self {
        let (status, entries) = match outcome {
            CompactOutcome::Archived { entries } => ("compacted", Some(entries)),
            CompactOutcome::Removed => ("removed", None),
        };
        Self {
            name: name.into(),
            status,
            entries,
        }
    }
}
