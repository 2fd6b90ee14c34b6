use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::core::auth::ApiKeyAuth;
use crate::core::config::SecurityConfig;
use crate::library::service::LibraryService;
use crate::storage::BlobStore;

use super::handlers;

// ---------------------------------------------------------------------------
// API router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
///
/// Generic over the store backend so the same router serves the in-memory
/// development backend and `S3BlobStore` (same `BlobStore` trait).
pub struct AppState<S> {
    pub library: Arc<LibraryService<S>>,
    pub auth: Arc<ApiKeyAuth>,
    pub start_time: std::time::Instant,
    /// Prometheus metrics handle for rendering the /metrics endpoint.
    pub metrics_handle: PrometheusHandle,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            library: self.library.clone(),
            auth: self.auth.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        }
    }
}

/// Build the full Axum router.
///
/// Route table:
///
/// **Library API (x-api-key authenticated):**
/// - `POST /api/files/uploads`           : upload one file into a folder
/// - `POST /api/files/uploads/multiples` : upload a batch of files
/// - `GET  /api/files?folder={folder}`   : album view
/// - `GET  /api/files/paths`             : top-level folders
/// - `GET  /api/files/paths/{*folder}`   : subfolder listing
///
/// **Health (unauthenticated):**
/// - `GET /healthz`                      : liveness probe
/// - `GET /readyz`                       : readiness probe
/// - `GET /metrics`                      : Prometheus metrics
pub fn build_router<S: BlobStore + 'static>(
    state: AppState<S>,
    security_config: &SecurityConfig,
) -> Router {
    // Browser players fetch album views and stream assets cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::HeaderName::from_static("x-api-key"),
        ]);

    let body_limit = DefaultBodyLimit::max(security_config.max_upload_body_bytes);

    Router::new()
        // Library API
        .route("/api/files", get(handlers::get_album))
        .route("/api/files/uploads", post(handlers::upload))
        .route(
            "/api/files/uploads/multiples",
            post(handlers::upload_multiples),
        )
        .route("/api/files/paths", get(handlers::list_top_level_folders))
        .route("/api/files/paths/{*folder}", get(handlers::list_sub_folders))
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(body_limit)
        // Tag every request with an x-request-id so storage errors can be
        // correlated across log lines.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
