//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use crate::host::{HostError, RegisterOutcome, RunReport};
use freshet_core::{
    CellReport, ContextPolicy, ExecutionSchedule, FlowOrder, SessionStats, Slice, SliceLine,
    SymbolStatus, Timestamp,
    primitives::{MAX_NAME_LENGTH, MAX_STATEMENT_SOURCE_LENGTH},
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Session status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub stats: SessionStats,
    pub schedule: ExecutionSchedule,
    pub flow_order: FlowOrder,
}

// =============================================================================
// CELL REGISTER REQUEST/RESPONSE
// =============================================================================

/// Cell register/edit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCellRequest {
    pub id: u64,
    pub position: Option<u64>,
    pub source: String,
}

impl RegisterCellRequest {
    /// Validate fields before they reach the host.
    ///
    /// Oversized payloads are rejected at the API boundary, before any
    /// parsing work happens.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.source.trim().is_empty() {
            return Err(HostError::Argument("cell source is empty".to_string()));
        }
        if self.source.len() > MAX_STATEMENT_SOURCE_LENGTH {
            return Err(HostError::Argument(format!(
                "cell source length {} exceeds maximum {} bytes",
                self.source.len(),
                MAX_STATEMENT_SOURCE_LENGTH
            )));
        }
        Ok(())
    }
}

/// Cell register/edit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub cell: Option<u64>,
    pub statements: Option<usize>,
    pub changed: Option<bool>,
    pub error: Option<String>,
}

impl RegisterResponse {
    pub fn success(outcome: &RegisterOutcome) -> Self {
        Self {
            success: true,
            cell: Some(outcome.cell.0),
            statements: Some(outcome.statements),
            changed: Some(outcome.changed),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            cell: None,
            statements: None,
            changed: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// RUN RESPONSE
// =============================================================================

/// Cell run response. `success` is false when the script raised; the
/// failure text is in `stderr`, and `error` stays reserved for requests
/// that never reached execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    pub counter: Option<u64>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub waiting: Vec<String>,
    pub error: Option<String>,
}

impl RunResponse {
    pub fn from_report(report: RunReport) -> Self {
        Self {
            success: report.clean(),
            counter: Some(report.counter),
            stdout: report.stdout,
            stderr: report.stderr,
            updated: report.updated,
            waiting: report.waiting,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            counter: None,
            stdout: String::new(),
            stderr: String::new(),
            updated: vec![],
            waiting: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CELLS RESPONSE
// =============================================================================

/// Per-cell freshness listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub cells: Vec<CellReport>,
    pub error: Option<String>,
}

impl CellsResponse {
    pub fn success(cells: Vec<CellReport>) -> Self {
        Self {
            success: true,
            cells,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            cells: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// SYMBOLS RESPONSE
// =============================================================================

/// One symbol in the listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub status: SymbolStatus,
    pub updated: Timestamp,
    pub required: Timestamp,
    pub tombstone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub type_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub import_origin: Option<String>,
}

/// Symbol listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub symbols: Vec<SymbolEntry>,
    pub error: Option<String>,
}

impl SymbolsResponse {
    pub fn success(symbols: Vec<SymbolEntry>) -> Self {
        Self {
            success: true,
            symbols,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            symbols: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// SLICE REQUEST/RESPONSE
// =============================================================================

/// Slice request. `at` pins the slice to a historical update; omitted it
/// slices from the symbol's latest write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceRequest {
    pub symbol: String,
    #[serde(default)]
    pub forward: bool,
    pub at: Option<Timestamp>,
    pub policy: Option<ContextPolicy>,
}

impl SliceRequest {
    /// Validate fields before they reach the host.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.symbol.is_empty() {
            return Err(HostError::Argument("symbol name is empty".to_string()));
        }
        if self.symbol.len() > MAX_NAME_LENGTH {
            return Err(HostError::Argument(format!(
                "symbol name length {} exceeds maximum {} bytes",
                self.symbol.len(),
                MAX_NAME_LENGTH
            )));
        }
        Ok(())
    }
}

/// Slice response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub lines: Vec<SliceLine>,
    pub code: Option<String>,
    pub error: Option<String>,
}

impl SliceResponse {
    pub fn success(slice: &Slice) -> Self {
        Self {
            success: true,
            code: Some(slice.code()),
            lines: slice.lines.clone(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            lines: vec![],
            code: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: Vec<u8>, checksum: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            checksum: Some(checksum),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            error: Some(msg.into()),
        }
    }
}
