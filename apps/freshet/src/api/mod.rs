//! # Freshet HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Session statistics and policy
//! - `POST /cells` - Register a new cell or edit an existing one
//! - `POST /cells/{id}/run` - Run a cell
//! - `GET /cells` - Per-cell freshness listing
//! - `GET /symbols` - Symbol listing with provenance notes
//! - `POST /slice` - Compute a program slice
//! - `GET /export` - Export the session snapshot
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `FRESHET_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `FRESHET_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `FRESHET_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
// Re-export handlers and types for integration tests (via `freshet::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    cells_handler, export_handler, health_handler, register_cell_handler, run_cell_handler,
    slice_handler, status_handler, symbols_handler,
};
#[allow(unused_imports)]
pub use types::{
    CellsResponse, ExportResponse, HealthResponse, RegisterCellRequest, RegisterResponse,
    RunResponse, SliceRequest, SliceResponse, StatusResponse, SymbolEntry, SymbolsResponse,
};

use crate::host::{HostError, Notebook};
use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use freshet_core::{FreshetError, SessionConfig};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Request body cap. A cell's source is limited to well under this, so
/// anything larger is noise or abuse.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the notebook.
#[derive(Clone)]
pub struct AppState {
    /// The notebook holding the session and interpreter.
    pub notebook: Arc<RwLock<Notebook>>,
}

impl AppState {
    /// Create new app state with an empty notebook.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            notebook: Arc::new(RwLock::new(Notebook::new(config))),
        }
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): CORS, tracing, rate limiting (if
/// enabled), authentication (if configured).
pub fn create_router(state: AppState) -> Router {
    let cors = middleware::build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = (rate_limit > 0).then(|| {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        create_rate_limiter(rate_limit)
    });
    if rate_limiter.is_none() {
        tracing::info!("Rate limiting disabled");
    }

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication disabled; set FRESHET_API_KEY to protect this server"
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/cells",
            get(handlers::cells_handler).post(handlers::register_cell_handler),
        )
        .route("/cells/{id}/run", post(handlers::run_cell_handler))
        .route("/symbols", get(handlers::symbols_handler))
        .route("/slice", post(handlers::slice_handler))
        .route("/export", get(handlers::export_handler));

    // Innermost layers run last on the way in
    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server with an empty notebook.
///
/// Runs until the listener fails or the process receives ctrl-c.
pub async fn run_server(addr: &str, config: SessionConfig) -> Result<(), HostError> {
    let state = AppState::new(config);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HostError::Engine(FreshetError::IoError(format!("Bind failed: {}", e))))?;

    tracing::info!("Freshet HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HostError::Engine(FreshetError::IoError(format!("Server error: {}", e))))
}

/// Resolves when the process receives ctrl-c.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to install ctrl-c handler: {}", e),
    }
}
