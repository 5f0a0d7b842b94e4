//! Upload, download and maintenance handlers for Web API.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::storage::{CompactionReport, InventoryListing, UploadBatch, UploadEntry, UploadResult};
use crate::web::dto::{
    ApiResponse, CompactQuery, DeleteResponse, FolderCompactResponse, ListQuery, PreviewResponse,
    PurgeResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::{run_blocking, AppState};

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are dropped, quotes and backslashes are replaced in the
/// plain `filename` parameter, and non-ASCII names also get an RFC 5987
/// `filename*` parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Build a download response.
fn download_response(
    content: Vec<u8>,
    filename: &str,
    content_type: &str,
) -> Result<Response<Body>, ApiError> {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(filename),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

fn multipart_error(e: MultipartError) -> ApiError {
    tracing::warn!("Failed to read multipart data: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::too_large("Upload exceeds the maximum request size")
    } else {
        ApiError::bad_request("Invalid multipart data")
    }
}

/// POST /api/upload - Upload files or a folder tree.
///
/// Request body: multipart/form-data with one `files` field per file. The
/// relative path of each file comes from a `paths` field at the same position
/// when present, otherwise from the field's filename.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResult>>, ApiError> {
    let mut paths: Vec<String> = Vec::new();
    let mut files: Vec<(Option<String>, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "files" => {
                let filename = field.file_name().map(|s| s.to_string());
                let content = field.bytes().await.map_err(multipart_error)?.to_vec();
                files.push((filename, content));
            }
            "paths" => {
                paths.push(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    let use_paths = paths.len() == files.len();
    let mut batch = UploadBatch::default();
    for (index, (filename, content)) in files.into_iter().enumerate() {
        let relative_path = if use_paths {
            paths[index].clone()
        } else {
            filename.ok_or_else(|| ApiError::bad_request("File field without a filename"))?
        };
        batch.push(UploadEntry::new(relative_path, content));
    }

    let store = state.store.clone();
    let result = run_blocking(move || store.ingest(&batch)).await?;

    Ok(Json(ApiResponse::new(result)))
}

/// GET /api/files - List loose files and folders.
pub async fn list_inventory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<InventoryListing>>, ApiError> {
    let store = state.store.clone();
    let listing = run_blocking(move || store.list_inventory(query.detailed)).await?;

    Ok(Json(ApiResponse::new(listing)))
}

/// GET /api/files/:name - Download a loose file.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response<Body>, ApiError> {
    fetch(state, vec![name]).await
}

/// GET /api/files/:folder/:name - Download a file inside a folder.
pub async fn download_folder_file(
    State(state): State<Arc<AppState>>,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Response<Body>, ApiError> {
    fetch(state, vec![folder, name]).await
}

async fn fetch(state: Arc<AppState>, segments: Vec<String>) -> Result<Response<Body>, ApiError> {
    let filename = segments.last().cloned().unwrap_or_default();
    let store = state.store.clone();
    let content = run_blocking(move || {
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        store.fetch_file(&segments)
    })
    .await?;

    let content_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();

    download_response(content, &filename, &content_type)
}

/// GET /api/archives/:folder - Download the archive of a compacted folder.
pub async fn download_archive(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let store = state.store.clone();
    let name = folder.clone();
    let content = run_blocking(move || store.fetch_archive(&name)).await?;

    download_response(content, &format!("{folder}.zip"), "application/zip")
}

/// GET /api/preview/:name - Preview a loose file as text.
pub async fn preview_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<PreviewResponse>>, ApiError> {
    preview(state, vec![name]).await
}

/// GET /api/preview/:folder/:name - Preview a file inside a folder as text.
pub async fn preview_folder_file(
    State(state): State<Arc<AppState>>,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Json<ApiResponse<PreviewResponse>>, ApiError> {
    preview(state, vec![folder, name]).await
}

async fn preview(
    state: Arc<AppState>,
    segments: Vec<String>,
) -> Result<Json<ApiResponse<PreviewResponse>>, ApiError> {
    let name = segments.join("/");
    let store = state.store.clone();
    let content = run_blocking(move || {
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        store.preview_text(&segments)
    })
    .await?;

    Ok(Json(ApiResponse::new(PreviewResponse { name, content })))
}

/// DELETE /api/files/:name - Delete a loose file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let store = state.store.clone();
    let target = name.clone();
    run_blocking(move || store.delete_file(&target)).await?;

    Ok(Json(ApiResponse::new(DeleteResponse { deleted: name })))
}

/// DELETE /api/folders/:name - Delete a folder and its archive.
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let store = state.store.clone();
    let target = name.clone();
    run_blocking(move || store.delete_folder(&target)).await?;

    Ok(Json(ApiResponse::new(DeleteResponse { deleted: name })))
}

/// DELETE /api/all - Delete everything not protected by an upload lock.
pub async fn delete_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PurgeResponse>>, ApiError> {
    let store = state.store.clone();
    let removed = run_blocking(move || store.delete_all()).await?;

    Ok(Json(ApiResponse::new(PurgeResponse { removed })))
}

/// POST /api/compact - Run a compaction sweep.
///
/// With `?folder=name` only that folder is compacted.
pub async fn compact(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompactQuery>,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    match query.folder {
        Some(folder) => {
            let name = folder.clone();
            let outcome = run_blocking(move || store.compact_folder(&name)).await?;
            Ok(Json(ApiResponse::new(FolderCompactResponse::new(folder, outcome))).into_response())
        }
        None => {
            let report: CompactionReport = run_blocking(move || store.compact_all()).await?;
            Ok(Json(ApiResponse::new(report)).into_response())
        }
    }
}
