use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::auth::{API_KEY_HEADER, INVALID_API_KEY_MESSAGE};
use crate::core::auth::KeyStatus;
use crate::core::error::LibraryError;
use crate::core::types::AssetUpload;
use crate::storage::BlobStore;

use super::router::AppState;

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

fn library_error_response(err: &LibraryError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_json(status, err.error_code(), &err.to_string())
}

// ---------------------------------------------------------------------------
// Auth helper
// ---------------------------------------------------------------------------

/// Pre-request `x-api-key` check.
///
/// Both a missing header and a mismatched key are answered with 401 and
/// the raw error message as the body, matching the contract consumed by
/// existing clients.
fn authenticate<S>(state: &AppState<S>, headers: &HeaderMap) -> Result<(), Response> {
    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    match state.auth.check(api_key) {
        KeyStatus::Valid => Ok(()),
        status => {
            debug!(?status, "request rejected by api key check");
            // Raw text body, answered identically for missing and wrong keys.
            Err((StatusCode::UNAUTHORIZED, INVALID_API_KEY_MESSAGE).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Multipart decoding
// ---------------------------------------------------------------------------

struct UploadForm {
    files: Vec<AssetUpload>,
    path: Option<String>,
}

/// Decode an upload form: repeated `file` parts plus one `path` part.
async fn parse_upload_form(mut multipart: Multipart) -> Result<UploadForm, Response> {
    let mut files = Vec::new();
    let mut path = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(error_json(
                    StatusCode::BAD_REQUEST,
                    "invalid_multipart",
                    &e.to_string(),
                ));
            }
        };

        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("unnamed")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return Err(error_json(
                            StatusCode::BAD_REQUEST,
                            "invalid_multipart",
                            &e.to_string(),
                        ));
                    }
                };
                files.push(AssetUpload {
                    data,
                    file_name,
                    content_type,
                });
            }
            Some("path") => {
                path = match field.text().await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        return Err(error_json(
                            StatusCode::BAD_REQUEST,
                            "invalid_multipart",
                            &e.to_string(),
                        ));
                    }
                };
            }
            _ => {
                // Unknown parts are ignored.
            }
        }
    }

    Ok(UploadForm { files, path })
}

// ---------------------------------------------------------------------------
// Upload handlers
// ---------------------------------------------------------------------------

/// `POST /api/files/uploads` : upload one file into a folder.
pub async fn upload<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if let Err(resp) = authenticate(&state, &headers) {
        return resp;
    }

    let form = match parse_upload_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };
    let Some(path) = form.path else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "invalid_argument",
            "missing 'path' form field",
        );
    };
    let Some(file) = form.files.into_iter().next() else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "invalid_argument",
            "missing 'file' form field",
        );
    };

    match state.library.upload_asset(file, &path).await {
        Ok(entry) => {
            info!(folder = %path, title = %entry.title, "upload accepted");
            (StatusCode::CREATED, Json(entry)).into_response()
        }
        Err(e) => {
            warn!(folder = %path, error = %e, "upload failed");
            library_error_response(&e)
        }
    }
}

/// `POST /api/files/uploads/multiples` : upload a batch of files into one
/// folder, strictly sequentially.
pub async fn upload_multiples<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if let Err(resp) = authenticate(&state, &headers) {
        return resp;
    }

    let form = match parse_upload_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };
    let Some(path) = form.path else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "invalid_argument",
            "missing 'path' form field",
        );
    };

    match state.library.upload_many(form.files, &path).await {
        Ok(entries) => {
            info!(folder = %path, count = entries.len(), "batch upload accepted");
            (StatusCode::CREATED, Json(entries)).into_response()
        }
        Err(e) => {
            warn!(folder = %path, error = %e, "batch upload failed");
            library_error_response(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Album and listing handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AlbumQuery {
    folder: Option<String>,
}

/// `GET /api/files?folder={folder}` : album view for one folder.
pub async fn get_album<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Query(query): Query<AlbumQuery>,
) -> Response {
    if let Err(resp) = authenticate(&state, &headers) {
        return resp;
    }

    let Some(folder) = query.folder else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "invalid_argument",
            "missing 'folder' query parameter",
        );
    };

    match state.library.get_album(&folder).await {
        Ok(album) => Json(album).into_response(),
        Err(e) => library_error_response(&e),
    }
}

/// `GET /api/files/paths` : top-level folders at the store root.
pub async fn list_top_level_folders<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authenticate(&state, &headers) {
        return resp;
    }

    match state.library.list_all_top_level_folders().await {
        Ok(folders) => Json(folders).into_response(),
        Err(e) => library_error_response(&e),
    }
}

/// `GET /api/files/paths/{folder}` : subfolder listing; the folder segment
/// may itself contain slashes.
pub async fn list_sub_folders<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(folder): Path<String>,
) -> Response {
    if let Err(resp) = authenticate(&state, &headers) {
        return resp;
    }

    match state.library.list_sub_folders_by_folder(&folder).await {
        Ok(folders) => Json(folders).into_response(),
        Err(e) => library_error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /healthz` : liveness probe.
pub async fn healthz<S: BlobStore>(State(state): State<AppState<S>>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /readyz` : readiness probe; checks storage reachability with a
/// listing under a prefix that matches nothing.
pub async fn readyz<S: BlobStore>(State(state): State<AppState<S>>) -> Response {
    let storage_check = state
        .library
        .store()
        .list_prefix("__health_check_nonexistent__/", "/")
        .await;

    match storage_check {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": {"storage": {"status": "ok"}},
                "auth_open_mode": state.auth.is_open_mode(),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "checks": {"storage": {"status": "error", "error": e.to_string()}},
                "auth_open_mode": state.auth.is_open_mode(),
            })),
        )
            .into_response(),
    }
}

/// `GET /metrics` : Prometheus metrics endpoint.
pub async fn metrics_handler<S: BlobStore>(State(state): State<AppState<S>>) -> Response {
    let metrics = state.metrics_handle.render();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
        .into_response()
}
