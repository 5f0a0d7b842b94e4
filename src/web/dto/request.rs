//! Request DTOs for Web API.

use serde::Deserialize;

/// Query parameters for the inventory listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Compute folder sizes (slower on large trees).
    #[serde(default)]
    pub detailed: bool,
}

/// Query parameters for compaction.
#[derive(Debug, Default, Deserialize)]
pub struct CompactQuery {
    /// Compact only this folder instead of sweeping the whole root.
    #[serde(default)]
    pub folder: Option<String>,
}
