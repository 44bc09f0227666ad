//! # Session
//!
//! The single handle a host holds. A session owns the symbol graph, the
//! tracer, the registered cells, and the execution history; every operation
//! goes through it and nothing lives in process globals. Hosts that need
//! shared access wrap the session themselves.
//!
//! ## Run protocol
//!
//! ```text
//! begin_run(cell)
//!   begin_statement(i) -> observe(..)* -> finish_statement()
//!   (or abort_statement() when the statement raised)
//! finish_run(stdout, stderr)
//! ```
//!
//! `finish_run` records the execution, propagates staleness from everything
//! the run updated, and refreshes every cell's static uses. A run abandoned
//! through [`Session::interrupt`] keeps its committed statements but records
//! no execution.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cell::{Cell, Execution, StatementInfo};
use crate::export;
use crate::external::CallResolver;
use crate::graph::{GraphCounts, SymbolGraph};
use crate::primitives::MAX_CELLS;
use crate::propagate::{
    cell_reports, propagate_updates, CellReport, ExecutionSchedule, FlowOrder, PropagationSummary,
};
use crate::slice::{ContextPolicy, Slice, Slicer};
use crate::symbol::SymbolStatus;
use crate::tracer::{
    CellCommit, EventOutcome, InterruptOutcome, StatementCommit, TraceEvent, Tracer,
};
use crate::types::{CellId, FreshetError, ObjectId, SymbolId, Timestamp};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Session-level policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// How re-run offers are computed.
    pub schedule: ExecutionSchedule,
    /// Whether dataflow may run against notebook order.
    pub flow_order: FlowOrder,
}

// =============================================================================
// STATUS SURFACES
// =============================================================================

/// Compact per-symbol view for status surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReport {
    /// The symbol.
    pub id: SymbolId,
    /// Display name.
    pub name: String,
    /// Freshness classification.
    pub status: SymbolStatus,
    /// Latest update.
    pub updated_ts: Timestamp,
    /// Newest ancestor update not yet consumed.
    pub required_ts: Timestamp,
    /// Whether the symbol is unbound.
    pub tombstone: bool,
}

/// Session-wide size counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionStats {
    /// Registered cells.
    pub cells: u64,
    /// Retained execution records.
    pub executions: u64,
    /// Current execution counter.
    pub exec_counter: u64,
    /// Graph sizes.
    pub graph: GraphCounts,
}

/// What one finished run changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The run's execution counter.
    pub counter: u64,
    /// Every symbol the run updated.
    pub updated: BTreeSet<SymbolId>,
    /// What staleness propagation did.
    pub propagation: PropagationSummary,
}

// =============================================================================
// SESSION
// =============================================================================

/// Owner of all per-notebook dataflow state.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    graph: SymbolGraph,
    tracer: Tracer,
    cells: BTreeMap<CellId, Cell>,
    executions: BTreeMap<u64, Execution>,
    exec_counter: u64,
    running: Option<CellId>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// Create a session with a seeded call resolver.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_resolver(config, CallResolver::seeded())
    }

    /// Create a session with a caller-supplied resolver.
    #[must_use]
    pub fn with_resolver(config: SessionConfig, resolver: CallResolver) -> Self {
        Self {
            config,
            graph: SymbolGraph::new(),
            tracer: Tracer::new(resolver),
            cells: BTreeMap::new(),
            executions: BTreeMap::new(),
            exec_counter: 0,
            running: None,
        }
    }

    pub(crate) fn from_parts(
        config: SessionConfig,
        graph: SymbolGraph,
        cells: BTreeMap<CellId, Cell>,
        executions: BTreeMap<u64, Execution>,
        exec_counter: u64,
        resolver: CallResolver,
    ) -> Self {
        Self {
            config,
            graph,
            tracer: Tracer::new(resolver),
            cells,
            executions,
            exec_counter,
            running: None,
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Replace the configuration. Takes effect on the next report.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    /// Read access to the symbol graph.
    #[must_use]
    pub fn graph(&self) -> &SymbolGraph {
        &self.graph
    }

    /// Retained execution records keyed by counter.
    #[must_use]
    pub fn executions(&self) -> &BTreeMap<u64, Execution> {
        &self.executions
    }

    /// Registered cells keyed by id.
    #[must_use]
    pub fn cells(&self) -> &BTreeMap<CellId, Cell> {
        &self.cells
    }

    /// The session execution counter.
    #[must_use]
    pub fn exec_counter(&self) -> u64 {
        self.exec_counter
    }

    /// The external-call resolver, for host registrations.
    pub fn resolver_mut(&mut self) -> &mut CallResolver {
        self.tracer.resolver_mut()
    }

    pub(crate) fn resolver(&self) -> &CallResolver {
        self.tracer.resolver()
    }

    // =========================================================================
    // CELL MANAGEMENT
    // =========================================================================

    /// Register a cell, or update its position and content if it exists.
    /// Edits keep the cell's run history.
    pub fn register_cell(
        &mut self,
        id: CellId,
        position: u64,
        statements: Vec<StatementInfo>,
    ) -> Result<(), FreshetError> {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.position = position;
            cell.edit(statements)?;
        } else {
            if self.cells.len() >= MAX_CELLS {
                return Err(FreshetError::LimitExceeded(format!(
                    "cell count exceeds {MAX_CELLS}"
                )));
            }
            self.cells.insert(id, Cell::new(id, position, statements)?);
        }
        self.refresh_static_uses(id);
        Ok(())
    }

    /// Replace a cell's statements. Returns whether the content changed.
    pub fn edit_cell(
        &mut self,
        id: CellId,
        statements: Vec<StatementInfo>,
    ) -> Result<bool, FreshetError> {
        let cell = self
            .cells
            .get_mut(&id)
            .ok_or(FreshetError::CellNotFound(id))?;
        let changed = cell.edit(statements)?;
        self.refresh_static_uses(id);
        Ok(changed)
    }

    /// Move a cell to a new notebook position.
    pub fn set_position(&mut self, id: CellId, position: u64) -> Result<(), FreshetError> {
        self.cells
            .get_mut(&id)
            .ok_or(FreshetError::CellNotFound(id))?
            .position = position;
        Ok(())
    }

    /// Remove a cell. Its execution history is retained.
    pub fn remove_cell(&mut self, id: CellId) -> Result<(), FreshetError> {
        self.cells
            .remove(&id)
            .map(|_| ())
            .ok_or(FreshetError::CellNotFound(id))
    }

    /// Look a cell up.
    pub fn cell(&self, id: CellId) -> Result<&Cell, FreshetError> {
        self.cells.get(&id).ok_or(FreshetError::CellNotFound(id))
    }

    // =========================================================================
    // RUN PROTOCOL
    // =========================================================================

    /// Start a run of `cell`, returning its execution counter.
    pub fn begin_run(&mut self, cell: CellId) -> Result<u64, FreshetError> {
        if !self.cells.contains_key(&cell) {
            return Err(FreshetError::CellNotFound(cell));
        }
        if self.running.is_some() || !self.tracer.is_idle() {
            return Err(FreshetError::TracerState(
                "a run is already in flight".to_string(),
            ));
        }
        self.exec_counter = self.exec_counter.saturating_add(1);
        self.tracer.begin_cell(self.exec_counter)?;
        self.running = Some(cell);
        Ok(self.exec_counter)
    }

    /// Start tracing statement `index` of the running cell.
    pub fn begin_statement(&mut self, index: usize) -> Result<Timestamp, FreshetError> {
        let cell = self.running.ok_or_else(|| {
            FreshetError::TracerState("begin_statement with no run in flight".to_string())
        })?;
        let info = self
            .cells
            .get(&cell)
            .ok_or(FreshetError::CellNotFound(cell))?
            .statements
            .get(index)
            .cloned()
            .ok_or_else(|| {
                FreshetError::TracerState(format!("statement index {index} out of range"))
            })?;
        self.tracer.begin_statement(&info)
    }

    /// Observe one event of the in-flight statement.
    pub fn observe(&mut self, event: TraceEvent) -> Result<EventOutcome, FreshetError> {
        self.tracer.observe(&mut self.graph, event)
    }

    /// Commit the in-flight statement.
    pub fn finish_statement(&mut self) -> Result<StatementCommit, FreshetError> {
        self.tracer.finish_statement(&mut self.graph)
    }

    /// Discard the in-flight statement (the statement raised).
    pub fn abort_statement(&mut self) -> Result<(), FreshetError> {
        self.tracer.abort_statement()
    }

    /// Interrupt the run. An aborted run keeps its committed statements but
    /// records no execution; its counter is not reused.
    pub fn interrupt(&mut self) -> InterruptOutcome {
        let outcome = self.tracer.interrupt();
        if outcome == InterruptOutcome::AbortedCell {
            self.running = None;
        }
        outcome
    }

    /// Finish the run: record the execution, capture output, propagate
    /// staleness, and refresh static uses.
    pub fn finish_run(&mut self, stdout: &str, stderr: &str) -> Result<RunOutcome, FreshetError> {
        let cell_id = self.running.take().ok_or_else(|| {
            FreshetError::TracerState("finish_run with no run in flight".to_string())
        })?;
        let commit: CellCommit = self.tracer.finish_cell()?;

        let cell = self
            .cells
            .get_mut(&cell_id)
            .ok_or(FreshetError::CellNotFound(cell_id))?;
        cell.note_run(commit.counter);
        cell.set_output(stdout, stderr);
        let sources: Vec<String> = cell.statements.iter().map(|s| s.source.clone()).collect();

        let mut execution = Execution::new(commit.counter, cell_id, sources);
        execution.used = commit.used;
        execution.updated = commit.updated;
        let updated = execution.all_updated();
        self.executions.insert(commit.counter, execution);

        let propagation = propagate_updates(&mut self.graph, &updated);
        self.refresh_all_static_uses();

        Ok(RunOutcome {
            counter: commit.counter,
            updated,
            propagation,
        })
    }

    // =========================================================================
    // STATUS & SLICING
    // =========================================================================

    /// Per-cell freshness and re-run offers under the configured schedule.
    #[must_use]
    pub fn reports(&self) -> Vec<CellReport> {
        cell_reports(
            &self.graph,
            &self.cells,
            &self.executions,
            self.config.schedule,
            self.config.flow_order,
        )
    }

    /// Per-symbol freshness, in id order.
    #[must_use]
    pub fn symbol_reports(&self) -> Vec<SymbolReport> {
        self.graph
            .symbols()
            .map(|s| SymbolReport {
                id: s.id,
                name: s.name.display(),
                status: s.status(),
                updated_ts: s.updated_ts(),
                required_ts: s.required_ts,
                tombstone: s.tombstone,
            })
            .collect()
    }

    /// Resolve a global name to its symbol.
    #[must_use]
    pub fn symbol_named(&self, name: &str) -> Option<SymbolId> {
        self.graph.lookup_global(name)
    }

    /// Backward slice of a global name.
    pub fn slice_backward(
        &self,
        name: &str,
        at: Option<Timestamp>,
        policy: ContextPolicy,
    ) -> Result<Slice, FreshetError> {
        let sym = self
            .symbol_named(name)
            .ok_or_else(|| FreshetError::NameNotFound(name.to_string()))?;
        Slicer::new(&self.graph, &self.executions)
            .with_policy(policy)
            .backward(sym, at)
    }

    /// Forward slice of a global name.
    pub fn slice_forward(
        &self,
        name: &str,
        from: Option<Timestamp>,
        policy: ContextPolicy,
    ) -> Result<Slice, FreshetError> {
        let sym = self
            .symbol_named(name)
            .ok_or_else(|| FreshetError::NameNotFound(name.to_string()))?;
        Slicer::new(&self.graph, &self.executions)
            .with_policy(policy)
            .forward(sym, from)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// The host reports a value's identity freed.
    pub fn identity_discarded(&mut self, obj: ObjectId) {
        self.graph.identity_discarded(obj);
    }

    /// Drop execution records older than the newest `keep_last`. Slices
    /// into dropped history render placeholders. Returns how many records
    /// were removed.
    pub fn prune_history(&mut self, keep_last: u64) -> usize {
        let cutoff = self.exec_counter.saturating_sub(keep_last);
        let keep = self.executions.split_off(&(cutoff + 1));
        let removed = self.executions.len();
        self.executions = keep;
        removed
    }

    /// Collect tombstoned symbols nothing references: no dependents and no
    /// retained execution record. Returns how many were removed.
    pub fn collect(&mut self) -> usize {
        let mut protected: BTreeSet<SymbolId> = BTreeSet::new();
        for execution in self.executions.values() {
            protected.extend(execution.all_used());
            protected.extend(execution.all_updated());
        }
        self.graph.collect(&protected)
    }

    /// Session-wide size counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            cells: self.cells.len() as u64,
            executions: self.executions.len() as u64,
            exec_counter: self.exec_counter,
            graph: self.graph.counts(),
        }
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Serialize the session into the canonical snapshot layout.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, FreshetError> {
        export::export_snapshot(self)
    }

    /// Restore a session from a snapshot.
    pub fn import_snapshot(bytes: &[u8]) -> Result<Self, FreshetError> {
        export::import_snapshot(bytes)
    }

    // =========================================================================
    // STATIC USES
    // =========================================================================

    fn refresh_static_uses(&mut self, id: CellId) {
        let Some(cell) = self.cells.get(&id) else {
            return;
        };
        let mut uses = BTreeSet::new();
        let mut unresolved = BTreeSet::new();
        for name in cell.read_names() {
            match self.graph.lookup_global(&name) {
                Some(sym) => {
                    uses.insert(sym);
                }
                None => {
                    unresolved.insert(name);
                }
            }
        }
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.static_uses = uses;
            cell.static_unresolved = unresolved;
        }
    }

    fn refresh_all_static_uses(&mut self) {
        let ids: Vec<CellId> = self.cells.keys().copied().collect();
        for id in ids {
            self.refresh_static_uses(id);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
