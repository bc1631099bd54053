//! API server setup.

use std::convert::Infallible;
use super::handlers::{convert_handler, health_handler, info_handler};
use super::middleware::{limit_upload_size, rate_limit};
use super::types::AppState;
use crate::config::ServiceConfig;
use crate::convert::Converter;
use crate::rate_limit::RateLimiter;
use crate::PdfError;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the API router.
///
/// Builds the shared converter (and its worker pool) and rate limiter from
/// `config`. Public so the router can be embedded or driven in tests.
pub fn create_router(config: ServiceConfig) -> Result<Router, PdfError> {
    let converter = Converter::new(config.convert_options())?;
    let limiter = RateLimiter::new(config.rate_limit);
    let body_limit = config
        .max_file_size_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let state = AppState {
        config: Arc::new(config),
        converter: Arc::new(converter),
        limiter: Arc::new(limiter),
    };

    // Layers wrap outward: the size guard runs before the rate limiter
    let convert_route: MethodRouter<AppState> = post(convert_handler)
        .layer::<_, Infallible>(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer::<_, Infallible>(middleware::from_fn_with_state(state.clone(), limit_upload_size))
        .layer(DefaultBodyLimit::max(body_limit));

    Ok(Router::new()
        .route("/convert", convert_route)
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Start the API server and run until Ctrl-C or SIGTERM.
pub async fn serve(config: ServiceConfig) -> Result<(), PdfError> {
    let host = config.host.clone();
    let port = config.port;
    log::info!(
        "Starting server in {} mode on {}:{} (max {} MB, {} pages, {}, {} workers)",
        config.env,
        host,
        port,
        config.max_file_size_mb,
        config.max_pages,
        config.rate_limit,
        config.workers
    );

    let app = create_router(config)?;
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, draining connections");
}
