//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::AppConfig;
use crate::host::{HostError, Notebook, RunReport, parse_script};
use freshet_core::{
    CellReport, ContextPolicy, ExecutionSchedule, FlowOrder, Timestamp, snapshot_checksum,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum script file size (1 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_SCRIPT_FILE_SIZE: u64 = 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), HostError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| HostError::Argument(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(HostError::Argument(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate file path for security.
///
/// This function:
/// 1. Canonicalizes the path to resolve symlinks and ".."
/// 2. Ensures the path exists
/// 3. Ensures the path is a file (not a directory)
///
/// # Security Note
///
/// This prevents path traversal attacks where a malicious path like
/// "../../../etc/passwd" could be used to access sensitive files.
fn validate_file_path(path: &Path) -> Result<PathBuf, HostError> {
    // Canonicalize resolves "..", symlinks, and validates existence
    let canonical = path.canonicalize().map_err(|e| {
        HostError::Argument(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    // Ensure it's a file, not a directory
    if !canonical.is_file() {
        return Err(HostError::Argument(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate output path for security.
///
/// For output files, we validate the parent directory exists and is writable.
fn validate_output_path(path: &Path) -> Result<PathBuf, HostError> {
    // Get parent directory
    let parent = path.parent().unwrap_or(Path::new("."));

    // Canonicalize parent to resolve ".." and symlinks
    let canonical_parent = parent.canonicalize().map_err(|e| {
        HostError::Argument(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    // Ensure parent is a directory
    if !canonical_parent.is_dir() {
        return Err(HostError::Argument(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    // Return the path with canonical parent + original filename
    let filename = path
        .file_name()
        .ok_or_else(|| HostError::Argument("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a script file after path and size validation.
fn load_script_file(path: &Path) -> Result<String, HostError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_SCRIPT_FILE_SIZE)?;
    Ok(std::fs::read_to_string(&validated)?)
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// Load the config file named on the command line, or the empty default.
pub fn load_app_config(path: Option<&Path>) -> Result<AppConfig, HostError> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

/// Parse a `--schedule` value.
pub fn parse_schedule(value: &str) -> Result<ExecutionSchedule, HostError> {
    match value {
        "liveness" => Ok(ExecutionSchedule::Liveness),
        "dag" => Ok(ExecutionSchedule::Dag),
        "hybrid" => Ok(ExecutionSchedule::Hybrid),
        "strict" => Ok(ExecutionSchedule::Strict),
        _ => Err(HostError::Argument(format!(
            "Unknown schedule: {}. Use: liveness, dag, hybrid, strict",
            value
        ))),
    }
}

/// Parse a `--flow-order` value.
pub fn parse_flow_order(value: &str) -> Result<FlowOrder, HostError> {
    match value {
        "any_order" => Ok(FlowOrder::AnyOrder),
        "in_order" => Ok(FlowOrder::InOrder),
        _ => Err(HostError::Argument(format!(
            "Unknown flow order: {}. Use: any_order, in_order",
            value
        ))),
    }
}

/// Parse a `--policy` value.
pub fn parse_policy(value: &str) -> Result<ContextPolicy, HostError> {
    match value {
        "prefer_dynamic" => Ok(ContextPolicy::PreferDynamic),
        "dynamic_only" => Ok(ContextPolicy::DynamicOnly),
        "static_only" => Ok(ContextPolicy::StaticOnly),
        _ => Err(HostError::Argument(format!(
            "Unknown context policy: {}. Use: prefer_dynamic, dynamic_only, static_only",
            value
        ))),
    }
}

/// Parse an `--at` value of the form `EXEC:STMT`, e.g. `3:0`.
pub fn parse_timestamp(value: &str) -> Result<Timestamp, HostError> {
    let Some((cell, stmt)) = value.split_once(':') else {
        return Err(HostError::Argument(format!(
            "Timestamp '{}' must be EXEC:STMT, e.g. 3:0",
            value
        )));
    };
    let cell: i64 = cell.trim().parse().map_err(|_| {
        HostError::Argument(format!("Invalid execution counter in timestamp '{}'", value))
    })?;
    let stmt: i64 = stmt.trim().parse().map_err(|_| {
        HostError::Argument(format!("Invalid statement index in timestamp '{}'", value))
    })?;
    if cell < 0 || stmt < 0 {
        return Err(HostError::Argument(format!(
            "Timestamp '{}' components must be non-negative",
            value
        )));
    }
    Ok(Timestamp::new(cell, stmt))
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run every cell of a script in notebook order.
pub fn cmd_run(
    config: &AppConfig,
    json_mode: bool,
    script: &Path,
    schedule: Option<&str>,
    flow_order: Option<&str>,
) -> Result<(), HostError> {
    let schedule = schedule.map(parse_schedule).transpose()?;
    let flow_order = flow_order.map(parse_flow_order).transpose()?;
    let session_config = config.session_config(schedule, flow_order);

    let source = load_script_file(script)?;
    let mut notebook = Notebook::new(session_config);
    notebook.load_script(&source)?;
    let runs = notebook.run_all()?;
    let cells = notebook.reports();

    if json_mode {
        let output = serde_json::json!({
            "script": script.to_string_lossy(),
            "runs": runs,
            "cells": cells,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    for report in &runs {
        let mark = if report.clean() { "ok " } else { "err" };
        println!("[{}] cell {} (run {})", mark, report.cell.0, report.counter);
        for line in report.stdout.lines() {
            println!("      {}", line);
        }
        if !report.stderr.is_empty() {
            println!("      error: {}", report.stderr);
        }
    }

    println!();
    print_cell_reports(&cells);

    Ok(())
}

/// Print the freshness table the way `GET /cells` reports it.
fn print_cell_reports(cells: &[CellReport]) {
    println!("Cell Freshness");
    println!("==============");
    for cell in cells {
        let run = cell
            .exec_count
            .map_or_else(|| "never ran".to_string(), |c| format!("run {}", c));
        let mut notes = String::new();
        if cell.ready {
            notes.push_str("  [ready]");
        }
        if cell.forward_only {
            notes.push_str("  [forward-only]");
        }
        if !cell.stale_inputs.is_empty() {
            notes.push_str(&format!("  stale inputs: {}", cell.stale_inputs.join(", ")));
        }
        println!(
            "  cell {:<4} pos {:<4} {:<9} {:?}{}",
            cell.cell.0, cell.position, run, cell.status, notes
        );
    }
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Parse a script and report names read before any cell writes them,
/// without executing anything.
pub fn cmd_check(json_mode: bool, script: &Path) -> Result<(), HostError> {
    let source = load_script_file(script)?;
    let cells = parse_script(&source)?;

    let mut defined: BTreeSet<String> = BTreeSet::new();
    let mut warnings = Vec::new();
    let mut statements = 0usize;

    for (cell_index, cell) in cells.iter().enumerate() {
        for parsed in &cell.statements {
            statements += 1;
            for name in parsed.stmt.reads() {
                if !defined.contains(&name) {
                    warnings.push((cell_index + 1, name, parsed.source.clone()));
                }
            }
            defined.extend(parsed.stmt.writes());
        }
    }

    if json_mode {
        let output = serde_json::json!({
            "script": script.to_string_lossy(),
            "cells": cells.len(),
            "statements": statements,
            "warnings": warnings
                .iter()
                .map(|(cell, name, source)| serde_json::json!({
                    "cell": cell,
                    "name": name,
                    "source": source,
                }))
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Script Check");
    println!("============");
    println!("Cells:      {}", cells.len());
    println!("Statements: {}", statements);
    println!();

    if warnings.is_empty() {
        println!("No warnings.");
    } else {
        println!("Warnings:");
        for (cell, name, source) in &warnings {
            println!(
                "  cell {}: `{}` is read before any cell writes it, in `{}`",
                cell, name, source
            );
        }
    }

    Ok(())
}

// =============================================================================
// SLICE COMMAND
// =============================================================================

/// Run a script, then print the slice for a symbol.
///
/// Script output is captured but not printed; the slice is the product.
pub fn cmd_slice(
    config: &AppConfig,
    json_mode: bool,
    script: &Path,
    symbol: &str,
    forward: bool,
    at: Option<&str>,
    policy: Option<&str>,
) -> Result<(), HostError> {
    let at = at.map(parse_timestamp).transpose()?;
    let policy = policy.map(parse_policy).transpose()?.unwrap_or_default();

    let source = load_script_file(script)?;
    let mut notebook = Notebook::new(config.session_config(None, None));
    notebook.load_script(&source)?;
    let runs = notebook.run_all()?;
    warn_failed_runs(&runs);

    let session = notebook.session();
    let slice = if forward {
        session.slice_forward(symbol, at, policy)?
    } else {
        session.slice_backward(symbol, at, policy)?
    };

    if json_mode {
        let output = serde_json::json!({
            "script": script.to_string_lossy(),
            "symbol": symbol,
            "forward": forward,
            "lines": slice.lines,
            "code": slice.code(),
            "failed_cells": runs
                .iter()
                .filter(|r| !r.clean())
                .map(|r| r.cell.0)
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    let direction = if forward { "forward" } else { "backward" };
    println!(
        "# {} slice of `{}` ({} statements)",
        direction,
        symbol,
        slice.lines.len()
    );
    print!("{}", slice.code());

    Ok(())
}

/// Cells that raised still leave committed prefixes behind; surface them.
fn warn_failed_runs(runs: &[RunReport]) {
    for report in runs {
        if !report.clean() {
            tracing::warn!("cell {} failed: {}", report.cell.0, report.stderr);
        }
    }
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Run a script and write the session snapshot to a file.
pub fn cmd_export(config: &AppConfig, script: &Path, output: &Path) -> Result<(), HostError> {
    // Validate output path before doing any work
    let validated_output = validate_output_path(output)?;

    let source = load_script_file(script)?;
    let mut notebook = Notebook::new(config.session_config(None, None));
    notebook.load_script(&source)?;
    let runs = notebook.run_all()?;
    warn_failed_runs(&runs);

    let session = notebook.session();
    let data = session.export_snapshot()?;
    let checksum = snapshot_checksum(session);
    println!("Checksum: {}", checksum);

    std::fs::write(&validated_output, &data)?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);

    Ok(())
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server with an empty notebook.
pub async fn cmd_serve(
    config: &AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), HostError> {
    let (host, port) = config.server_addr(host, port);
    let session_config = config.session_config(None, None);

    println!("Freshet Dataflow Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", host);
    println!("  Port:       {}", port);
    println!("  Schedule:   {:?}", session_config.schedule);
    println!("  Flow order: {:?}", session_config.flow_order);
    println!();
    println!("Endpoints:");
    println!("  GET  /health          - Health check");
    println!("  GET  /status          - Session statistics");
    println!("  POST /cells           - Register or edit a cell");
    println!("  POST /cells/{{id}}/run - Run a cell");
    println!("  GET  /cells           - Cell freshness listing");
    println!("  GET  /symbols         - Symbol listing");
    println!("  POST /slice           - Compute a slice");
    println!("  GET  /export          - Session snapshot");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, session_config).await
}
