//! # Freshet Application Library
//!
//! Everything around the engine: the script host, the HTTP API, the CLI,
//! and configuration. The engine itself lives in `freshet-core`.
//!
//! - [`host`] - script parser, interpreter, and notebook orchestration
//! - [`api`] - HTTP REST API server (axum-based)
//! - [`cli`] - command-line interface (clap-based)
//! - [`config`] - TOML configuration with CLI overrides

pub mod api;
pub mod cli;
pub mod config;
pub mod host;
