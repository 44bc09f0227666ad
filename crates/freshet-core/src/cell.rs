//! # Cells and Execution History
//!
//! A [`Cell`] is one registered, re-runnable unit of code. Its identity is
//! stable across edits and runs; every run draws a fresh session-wide
//! execution counter. The statement list is supplied pre-parsed by the host
//! ([`StatementInfo`] carries the source text plus the syntactic read and
//! written names), and a content fingerprint detects unchanged text across
//! edits.
//!
//! An [`Execution`] snapshots one run: the statement sources as they ran and
//! the symbols used/updated per statement timestamp. Executions are retained
//! for the whole session so slices and queries can reference history by
//! counter indefinitely.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::primitives::{
    MAX_CAPTURED_OUTPUT, MAX_NAME_LENGTH, MAX_STATEMENTS_PER_CELL, MAX_STATEMENT_SOURCE_LENGTH,
};
use crate::types::{CellId, FreshetError, SymbolId, Timestamp};

// =============================================================================
// STATEMENT INFO
// =============================================================================

/// One parsed statement as supplied by the host.
///
/// `reads`/`writes` are the syntactic name sets (liveness information); the
/// engine uses them for static-context edges and unexecuted-cell warnings.
/// They may over-approximate what actually executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatementInfo {
    /// Source text of the statement.
    pub source: String,
    /// Names the statement may read.
    pub reads: Vec<String>,
    /// Names the statement may bind or rebind.
    pub writes: Vec<String>,
}

impl StatementInfo {
    /// Create a statement record.
    #[must_use]
    pub fn new(source: impl Into<String>, reads: Vec<String>, writes: Vec<String>) -> Self {
        Self {
            source: source.into(),
            reads,
            writes,
        }
    }
}

/// Validate a statement list against the registration limits.
pub fn validate_statements(statements: &[StatementInfo]) -> Result<(), FreshetError> {
    if statements.len() > MAX_STATEMENTS_PER_CELL {
        return Err(FreshetError::LimitExceeded(format!(
            "cell has {} statements, maximum is {}",
            statements.len(),
            MAX_STATEMENTS_PER_CELL
        )));
    }
    for stmt in statements {
        if stmt.source.len() > MAX_STATEMENT_SOURCE_LENGTH {
            return Err(FreshetError::LimitExceeded(format!(
                "statement source is {} bytes, maximum is {}",
                stmt.source.len(),
                MAX_STATEMENT_SOURCE_LENGTH
            )));
        }
        for name in stmt.reads.iter().chain(stmt.writes.iter()) {
            if name.len() > MAX_NAME_LENGTH {
                return Err(FreshetError::LimitExceeded(format!(
                    "name is {} bytes, maximum is {}",
                    name.len(),
                    MAX_NAME_LENGTH
                )));
            }
        }
    }
    Ok(())
}

/// Content fingerprint of a statement list.
///
/// Rotate-and-xor over the sources, order sensitive. Not cryptographic;
/// detects accidental text changes only.
#[must_use]
pub fn fingerprint(statements: &[StatementInfo]) -> u64 {
    let mut hash: u64 = 0;
    for (i, stmt) in statements.iter().enumerate() {
        hash ^= (i as u64).rotate_left(11);
        for byte in stmt.source.as_bytes() {
            hash = hash.rotate_left(5) ^ u64::from(*byte);
        }
    }
    hash
}

// =============================================================================
// CELL
// =============================================================================

/// One registered, re-runnable unit of code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Stable identity across edits and runs.
    pub id: CellId,
    /// Notebook position, used by the in-order flow policy. Editable.
    pub position: u64,
    /// Current parsed statement list.
    pub statements: Vec<StatementInfo>,
    /// Fingerprint of the current statement list.
    pub fingerprint: u64,
    /// Latest execution counter, `None` until the first run.
    pub exec_count: Option<u64>,
    /// Every counter this cell ran under, in order.
    pub run_counters: Vec<u64>,
    /// Captured stdout of the last run.
    pub stdout: String,
    /// Captured stderr of the last run.
    pub stderr: String,
    /// Symbols the current text reads, resolved against the current graph.
    /// Refreshed at registration, edit, and after each run.
    pub static_uses: BTreeSet<SymbolId>,
    /// Read names in the current text that did not resolve to any symbol.
    pub static_unresolved: BTreeSet<String>,
    /// Whether the text changed since the last run.
    pub dirty: bool,
}

impl Cell {
    /// Register a cell. Statement limits are enforced here.
    pub fn new(
        id: CellId,
        position: u64,
        statements: Vec<StatementInfo>,
    ) -> Result<Self, FreshetError> {
        validate_statements(&statements)?;
        let fingerprint = fingerprint(&statements);
        Ok(Self {
            id,
            position,
            statements,
            fingerprint,
            exec_count: None,
            run_counters: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            static_uses: BTreeSet::new(),
            static_unresolved: BTreeSet::new(),
            dirty: false,
        })
    }

    /// Replace the statement list. Returns whether the content changed.
    pub fn edit(&mut self, statements: Vec<StatementInfo>) -> Result<bool, FreshetError> {
        validate_statements(&statements)?;
        let new_fingerprint = fingerprint(&statements);
        let changed = new_fingerprint != self.fingerprint;
        self.statements = statements;
        self.fingerprint = new_fingerprint;
        if changed {
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Record that this cell ran under `counter`.
    pub fn note_run(&mut self, counter: u64) {
        self.exec_count = Some(counter);
        self.run_counters.push(counter);
        self.dirty = false;
    }

    /// Store captured output for the last run, truncated at the cap.
    pub fn set_output(&mut self, stdout: &str, stderr: &str) {
        self.stdout = truncate_capture(stdout);
        self.stderr = truncate_capture(stderr);
    }

    /// All syntactic read names of the current text.
    #[must_use]
    pub fn read_names(&self) -> BTreeSet<String> {
        self.statements
            .iter()
            .flat_map(|s| s.reads.iter().cloned())
            .collect()
    }

    /// All syntactic written names of the current text.
    #[must_use]
    pub fn written_names(&self) -> BTreeSet<String> {
        self.statements
            .iter()
            .flat_map(|s| s.writes.iter().cloned())
            .collect()
    }
}

fn truncate_capture(text: &str) -> String {
    if text.len() <= MAX_CAPTURED_OUTPUT {
        return text.to_string();
    }
    // Truncate on a char boundary at or below the cap
    let mut end = MAX_CAPTURED_OUTPUT;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

// =============================================================================
// EXECUTION (one run, retained forever)
// =============================================================================

/// Snapshot of one run of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// The session-wide execution counter of this run.
    pub counter: u64,
    /// The cell that ran.
    pub cell: CellId,
    /// Statement sources exactly as executed.
    pub statements: Vec<String>,
    /// Symbols read, keyed by statement timestamp.
    pub used: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
    /// Symbols written, keyed by statement timestamp.
    pub updated: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
}

impl Execution {
    /// Start an execution record for `cell` under `counter`.
    #[must_use]
    pub fn new(counter: u64, cell: CellId, statements: Vec<String>) -> Self {
        Self {
            counter,
            cell,
            statements,
            used: BTreeMap::new(),
            updated: BTreeMap::new(),
        }
    }

    /// Source text of the statement at `ts`, if `ts` belongs to this run.
    #[must_use]
    pub fn source_at(&self, ts: Timestamp) -> Option<&str> {
        if ts.cell != self.counter as i64 {
            return None;
        }
        usize::try_from(ts.stmt)
            .ok()
            .and_then(|i| self.statements.get(i))
            .map(String::as_str)
    }

    /// Union of symbols read anywhere in this run.
    #[must_use]
    pub fn all_used(&self) -> BTreeSet<SymbolId> {
        self.used.values().flatten().copied().collect()
    }

    /// Union of symbols written anywhere in this run.
    #[must_use]
    pub fn all_updated(&self) -> BTreeSet<SymbolId> {
        self.updated.values().flatten().copied().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(source: &str) -> StatementInfo {
        StatementInfo::new(source, Vec::new(), Vec::new())
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let ab = fingerprint(&[stmt("a = 1"), stmt("b = 2")]);
        let ba = fingerprint(&[stmt("b = 2"), stmt("a = 1")]);
        let ab2 = fingerprint(&[stmt("a = 1"), stmt("b = 2")]);

        assert_ne!(ab, ba);
        assert_eq!(ab, ab2);
    }

    #[test]
    fn edit_reports_content_change() {
        let mut cell = Cell::new(CellId(1), 0, vec![stmt("x = 1")]).expect("valid cell");
        let original = cell.fingerprint;

        assert!(!cell.edit(vec![stmt("x = 1")]).expect("edit"));
        assert_eq!(cell.fingerprint, original);

        assert!(cell.edit(vec![stmt("x = 2")]).expect("edit"));
        assert_ne!(cell.fingerprint, original);
    }

    #[test]
    fn statement_limit_enforced() {
        let statements: Vec<_> = (0..MAX_STATEMENTS_PER_CELL + 1)
            .map(|i| stmt(&format!("x{i} = {i}")))
            .collect();
        let err = Cell::new(CellId(1), 0, statements);
        assert!(matches!(err, Err(FreshetError::LimitExceeded(_))));
    }

    #[test]
    fn oversized_name_rejected() {
        let long = "n".repeat(MAX_NAME_LENGTH + 1);
        let statements = vec![StatementInfo::new("y = n", vec![long], vec!["y".into()])];
        assert!(matches!(
            validate_statements(&statements),
            Err(FreshetError::LimitExceeded(_))
        ));
    }

    #[test]
    fn output_capture_truncated() {
        let mut cell = Cell::new(CellId(1), 0, vec![stmt("x = 1")]).expect("valid cell");
        let big = "o".repeat(MAX_CAPTURED_OUTPUT + 100);
        cell.set_output(&big, "err");
        assert_eq!(cell.stdout.len(), MAX_CAPTURED_OUTPUT);
        assert_eq!(cell.stderr, "err");
    }

    #[test]
    fn execution_source_lookup() {
        let exec = Execution::new(3, CellId(1), vec!["x = 1".into(), "y = x".into()]);

        assert_eq!(exec.source_at(Timestamp::new(3, 1)), Some("y = x"));
        assert_eq!(exec.source_at(Timestamp::new(3, 2)), None);
        assert_eq!(exec.source_at(Timestamp::new(2, 0)), None);
    }
}
