//! Router configuration for Web API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers::{
    compact, delete_all, delete_file, delete_folder, download_archive, download_file,
    download_folder_file, list_inventory, preview_file, preview_folder_file, upload, AppState,
};
use super::middleware::create_cors_layer;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(app_state.max_upload_size).unwrap_or(usize::MAX);

    let file_routes = Router::new()
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(body_limit)))
        .route("/files", get(list_inventory))
        .route("/files/:name", get(download_file).delete(delete_file))
        .route("/files/:folder/:name", get(download_folder_file))
        .route("/archives/:folder", get(download_archive))
        .route("/preview/:name", get(preview_file))
        .route("/preview/:folder/:name", get(preview_folder_file))
        .route("/folders/:name", delete(delete_folder))
        .route("/all", delete(delete_all))
        .route("/compact", post(compact));

    Router::new()
        .nest("/api", file_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// Create a router serving the web UI from `static_path`.
///
/// Returns `None` when the directory does not exist.
pub fn create_static_router(static_path: &str) -> Option<Router> {
    let dir = Path::new(static_path);
    if !dir.is_dir() {
        tracing::warn!("Static path {} not found, web UI disabled", static_path);
        return None;
    }

    let index = ServeFile::new(dir.join("index.html"));
    Some(Router::new().fallback_service(ServeDir::new(dir).fallback(index)))
}
