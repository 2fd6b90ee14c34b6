use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use playbox::api::router::{self, AppState};
use playbox::core::auth::ApiKeyAuth;
use playbox::core::config::AppConfig;
use playbox::core::shutdown::{ShutdownCoordinator, SHUTDOWN_TIMEOUT_SECS};
use playbox::library::service::LibraryService;
use playbox::observability::metrics as obs_metrics;
use playbox::storage::memory::InMemoryBlobStore;
use playbox::storage::BlobStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Install the Prometheus recorder before any metrics are recorded.
    let metrics_handle = obs_metrics::install_prometheus_recorder();

    // Install panic hook: log panics with full backtrace.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "playbox starting");
    obs_metrics::describe_all_metrics();

    let auth = Arc::new(ApiKeyAuth::new(&config.auth));
    if auth.is_open_mode() {
        warn!("no api_secret configured, running in open mode (no authentication)");
    }

    match config.storage.backend.as_str() {
        "memory" => {
            info!("using in-memory storage backend (development only, state is not durable)");
            let store = Arc::new(InMemoryBlobStore::new());
            run_server(store, config, auth, metrics_handle).await
        }
        #[cfg(feature = "s3")]
        "s3" => {
            let store = match playbox::storage::s3::S3BlobStore::new(&config.storage).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "failed to initialize S3 storage backend");
                    return ExitCode::FAILURE;
                }
            };
            info!(
                bucket = %config.storage.bucket,
                endpoint = %config.storage.endpoint,
                "using S3 storage backend"
            );
            run_server(store, config, auth, metrics_handle).await
        }
        other => {
            error!(
                backend = other,
                "unknown storage backend (did you build without the 's3' feature?)"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run_server<S: BlobStore + 'static>(
    store: Arc<S>,
    config: AppConfig,
    auth: Arc<ApiKeyAuth>,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> ExitCode {
    let shutdown = ShutdownCoordinator::new();
    let library = Arc::new(LibraryService::new(store, config.library.clone()));

    let state = AppState {
        library,
        auth,
        start_time: std::time::Instant::now(),
        metrics_handle,
    };
    let app = router::build_router(state, &config.security);

    let http_addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port)
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid HTTP bind address");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%http_addr, error = %e, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    info!(%http_addr, "HTTP server listening");

    // Run the HTTP server until the shutdown token fires, then drain.
    let serve_token = shutdown.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                serve_token.cancelled().await;
            })
            .await
    });

    shutdown.wait_for_signal_and_shutdown().await;

    match tokio::time::timeout(
        std::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        server,
    )
    .await
    {
        Ok(Ok(Ok(()))) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task panicked");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("shutdown timed out after {}s, forcing exit", SHUTDOWN_TIMEOUT_SECS);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
