//! # Application Configuration
//!
//! Optional TOML file with `[engine]` and `[server]` tables. Every field
//! is optional; command-line flags override the file, and built-in
//! defaults cover the rest.
//!
//! ```toml
//! [engine]
//! schedule = "dag"
//! flow_order = "in_order"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! ```

use crate::host::HostError;
use freshet_core::{ExecutionSchedule, FlowOrder, SessionConfig};
use serde::Deserialize;
use std::path::Path;

/// Config files have no business being large.
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Bind address when neither the file nor the CLI names one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port when neither the file nor the CLI names one.
pub const DEFAULT_PORT: u16 = 3000;

// =============================================================================
// FILE SHAPE
// =============================================================================

/// Parsed contents of a config file. `Default` is the empty file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// `[engine]` table.
    #[serde(default)]
    pub engine: EngineSection,
    /// `[server]` table.
    #[serde(default)]
    pub server: ServerSection,
}

/// Engine policy knobs.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// `schedule = "liveness" | "dag" | "hybrid" | "strict"`
    pub schedule: Option<ExecutionSchedule>,
    /// `flow_order = "any_order" | "in_order"`
    pub flow_order: Option<FlowOrder>,
}

/// Server bind settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind host.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
}

impl AppConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let meta = std::fs::metadata(path).map_err(|e| {
            HostError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        if meta.len() > MAX_CONFIG_FILE_SIZE {
            return Err(HostError::Config(format!(
                "config file {} exceeds {MAX_CONFIG_FILE_SIZE} bytes",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            HostError::Config(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Engine settings with CLI flags taking precedence over the file.
    #[must_use]
    pub fn session_config(
        &self,
        schedule: Option<ExecutionSchedule>,
        flow_order: Option<FlowOrder>,
    ) -> SessionConfig {
        SessionConfig {
            schedule: schedule
                .or(self.engine.schedule)
                .unwrap_or_default(),
            flow_order: flow_order
                .or(self.engine.flow_order)
                .unwrap_or_default(),
        }
    }

    /// Bind address with CLI flags taking precedence over the file.
    #[must_use]
    pub fn server_addr(&self, host: Option<String>, port: Option<u16>) -> (String, u16) {
        let host = host
            .or_else(|| self.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = port.or(self.server.port).unwrap_or(DEFAULT_PORT);
        (host, port)
    }
}

// =============================================================================
// TESTS
// =============================================================================
