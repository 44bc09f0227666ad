//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        CellsResponse, ExportResponse, HealthResponse, RegisterCellRequest, RegisterResponse,
        RunResponse, SliceRequest, SliceResponse, StatusResponse, SymbolEntry, SymbolsResponse,
    },
};
use crate::host::HostError;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use freshet_core::{CellId, FreshetError, snapshot_checksum};

/// Map a host failure to a status code. Script-level failures never land
/// here; they come back inside a successful response body.
fn error_status(err: &HostError) -> StatusCode {
    match err {
        HostError::Parse { .. } | HostError::Argument(_) => StatusCode::BAD_REQUEST,
        HostError::Engine(
            FreshetError::CellNotFound(_)
            | FreshetError::NameNotFound(_)
            | FreshetError::SymbolNotFound(_)
            | FreshetError::TimestampNotFound(..),
        ) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get session status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let notebook = state.notebook.read().await;
    let session = notebook.session();
    let config = session.config();

    let response = StatusResponse {
        stats: session.stats(),
        schedule: config.schedule,
        flow_order: config.flow_order,
    };

    (StatusCode::OK, Json(response))
}

// =============================================================================
// CELL HANDLERS
// =============================================================================

/// Register a new cell or edit an existing one.
pub async fn register_cell_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterCellRequest>,
) -> impl IntoResponse {
    // Validate before taking the write lock
    if let Err(e) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(RegisterResponse::error(format!("Invalid cell: {}", e))),
        );
    }

    let mut notebook = state.notebook.write().await;
    match notebook.register_cell(CellId(request.id), request.position, &request.source) {
        Ok(outcome) => (StatusCode::OK, Json(RegisterResponse::success(&outcome))),
        Err(e) => (
            error_status(&e),
            Json(RegisterResponse::error(format!("Register failed: {}", e))),
        ),
    }
}

/// Run one cell.
pub async fn run_cell_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut notebook = state.notebook.write().await;
    match notebook.run_cell(CellId(id)) {
        Ok(report) => (StatusCode::OK, Json(RunResponse::from_report(report))),
        Err(e) => (
            error_status(&e),
            Json(RunResponse::error(format!("Run failed: {}", e))),
        ),
    }
}

/// Per-cell freshness listing.
pub async fn cells_handler(State(state): State<AppState>) -> impl IntoResponse {
    let notebook = state.notebook.read().await;
    (
        StatusCode::OK,
        Json(CellsResponse::success(notebook.reports())),
    )
}

// =============================================================================
// SYMBOLS HANDLER
// =============================================================================

/// Symbol listing with freshness and provenance notes.
pub async fn symbols_handler(State(state): State<AppState>) -> impl IntoResponse {
    let notebook = state.notebook.read().await;
    let session = notebook.session();
    let graph = session.graph();

    let symbols = session
        .symbol_reports()
        .into_iter()
        .map(|report| {
            let (type_note, import_origin) = graph.symbol(report.id).map_or(
                (None, None),
                |s| (s.type_note.clone(), s.import_origin.clone()),
            );
            SymbolEntry {
                name: report.name,
                status: report.status,
                updated: report.updated_ts,
                required: report.required_ts,
                tombstone: report.tombstone,
                type_note,
                import_origin,
            }
        })
        .collect();

    (StatusCode::OK, Json(SymbolsResponse::success(symbols)))
}

// =============================================================================
// SLICE HANDLER
// =============================================================================

/// Compute a program slice for a symbol.
pub async fn slice_handler(
    State(state): State<AppState>,
    Json(request): Json<SliceRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SliceResponse::error(format!("Invalid slice request: {}", e))),
        );
    }

    let notebook = state.notebook.read().await;
    let session = notebook.session();
    let policy = request.policy.unwrap_or_default();

    let result = if request.forward {
        session.slice_forward(&request.symbol, request.at, policy)
    } else {
        session.slice_backward(&request.symbol, request.at, policy)
    };

    match result {
        Ok(slice) => (StatusCode::OK, Json(SliceResponse::success(&slice))),
        Err(e) => {
            let err = HostError::Engine(e);
            (
                error_status(&err),
                Json(SliceResponse::error(format!("Slice failed: {}", err))),
            )
        }
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export the session snapshot in canonical format.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let notebook = state.notebook.read().await;
    let session = notebook.session();

    match session.export_snapshot() {
        Ok(data) => {
            let checksum = snapshot_checksum(session);
            (
                StatusCode::OK,
                Json(ExportResponse::success(data, checksum)),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}
