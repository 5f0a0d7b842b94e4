//! API handlers for the web adapter.

pub mod file;

pub use file::*;

use crate::storage::UploadStore;
use crate::web::error::ApiError;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Upload engine.
    pub store: UploadStore,
    /// Maximum request body size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(store: UploadStore, max_upload_size_mb: u64) -> Self {
        Self {
            store,
            max_upload_size: max_upload_size_mb * 1024 * 1024,
        }
    }
}

/// Run a blocking engine call off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("Storage task failed: {}", e);
            ApiError::internal("Storage task failed")
        })?
        .map_err(ApiError::from)
}
