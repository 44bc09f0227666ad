//! # Script Host Module
//!
//! The reference host for the Freshet engine: a small cell-structured
//! script language, an interpreter that executes it against a real heap,
//! and a [`Notebook`] that wires both to a [`Session`].
//!
//! The host exists so the engine can be driven end to end without a
//! notebook front-end. Every read, write, delete, and container method
//! call the interpreter performs is streamed to the tracer as a
//! [`freshet_core::TraceEvent`], so cell reports, staleness, and slices
//! come out exactly as they would under a live kernel.

mod interp;
mod parser;

pub use interp::Interp;
pub use parser::{BinOp, Builtin, Expr, ParsedCell, ParsedStatement, Stmt, parse_script};

use freshet_core::{CellId, CellReport, FreshetError, Session, SessionConfig, SymbolId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Everything that can go wrong between a script file and the engine.
#[derive(Debug, Error)]
pub enum HostError {
    /// The script text could not be parsed.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based source line.
        line: usize,
        /// What the parser expected or found.
        message: String,
    },
    /// The script failed while executing. Recorded per-run as stderr.
    #[error("{0}")]
    Runtime(String),
    /// The engine rejected an operation.
    #[error(transparent)]
    Engine(#[from] FreshetError),
    /// Reading or writing a file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A config file or config value could not be used.
    #[error("invalid config: {0}")]
    Config(String),
    /// A command-line argument could not be used.
    #[error("invalid argument: {0}")]
    Argument(String),
}

// =============================================================================
// RUN RESULTS
// =============================================================================

/// What registering one cell did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterOutcome {
    /// The cell.
    pub cell: CellId,
    /// Statements in the registered program.
    pub statements: usize,
    /// Whether the content differs from what was registered before.
    /// Always true for a first registration.
    pub changed: bool,
}

/// What one cell run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The cell that ran.
    pub cell: CellId,
    /// The run's execution counter.
    pub counter: u64,
    /// Captured print output.
    pub stdout: String,
    /// The runtime error that stopped the cell, or empty for a clean run.
    pub stderr: String,
    /// Display names of every symbol the run updated.
    pub updated: Vec<String>,
    /// Display names of symbols staleness propagation marked waiting.
    pub waiting: Vec<String>,
}

impl RunReport {
    /// Whether the run completed without a runtime error.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.stderr.is_empty()
    }
}

// =============================================================================
// NOTEBOOK
// =============================================================================

/// An engine session plus the interpreter state that feeds it.
///
/// The notebook is the single entry point for program changes and runs,
/// so the host-side program store and the engine's cell registry never
/// drift apart.
#[derive(Debug)]
pub struct Notebook {
    session: Session,
    interp: Interp,
    programs: BTreeMap<CellId, Vec<ParsedStatement>>,
}

impl Notebook {
    /// Create an empty notebook.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: Session::new(config),
            interp: Interp::new(),
            programs: BTreeMap::new(),
        }
    }

    /// Read access to the underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Replace the scheduling configuration.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.session.set_config(config);
    }

    /// Registered cell ids in order.
    #[must_use]
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.programs.keys().copied().collect()
    }

    /// Parse a whole script and register its cells as 1, 2, ... with
    /// positions matching file order.
    pub fn load_script(&mut self, source: &str) -> Result<Vec<CellId>, HostError> {
        let cells = parse_script(source)?;
        let mut ids = Vec::with_capacity(cells.len());
        for (i, cell) in cells.into_iter().enumerate() {
            let id = CellId(i as u64 + 1);
            self.session.register_cell(id, i as u64 + 1, cell.infos())?;
            self.programs.insert(id, cell.statements);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Register a new cell or edit an existing one from source text.
    ///
    /// The source is one cell's worth of statements; separator lines are
    /// rejected. When `position` is `None` a new cell takes its id as its
    /// position and an edited cell keeps the position it had.
    pub fn register_cell(
        &mut self,
        id: CellId,
        position: Option<u64>,
        source: &str,
    ) -> Result<RegisterOutcome, HostError> {
        let mut cells = parse_script(source)?;
        if cells.len() > 1 {
            return Err(HostError::Parse {
                line: 1,
                message: "cell source must not contain `# %%` separators".to_string(),
            });
        }
        let parsed = cells.pop().unwrap_or_default();
        let infos = parsed.infos();
        let statements = infos.len();

        let changed = if self.programs.contains_key(&id) {
            let changed = self.session.edit_cell(id, infos)?;
            if let Some(pos) = position {
                self.session.set_position(id, pos)?;
            }
            changed
        } else {
            self.session
                .register_cell(id, position.unwrap_or(id.0), infos)?;
            true
        };
        self.programs.insert(id, parsed.statements);

        Ok(RegisterOutcome {
            cell: id,
            statements,
            changed,
        })
    }

    /// Execute one cell through the full trace protocol.
    ///
    /// A runtime error stops the cell after rolling back the failing
    /// statement; earlier statements stay committed and the error text is
    /// recorded as the run's stderr. `Err` is reserved for protocol and
    /// engine faults.
    pub fn run_cell(&mut self, id: CellId) -> Result<RunReport, HostError> {
        let program = self
            .programs
            .get(&id)
            .cloned()
            .ok_or(FreshetError::CellNotFound(id))?;

        let counter = self.session.begin_run(id)?;
        let mut failure: Option<String> = None;

        for (index, statement) in program.iter().enumerate() {
            self.session.begin_statement(index)?;
            match self.interp.exec(&mut self.session, &statement.stmt) {
                Ok(()) => {
                    self.session.finish_statement()?;
                }
                Err(e) => {
                    self.session.abort_statement()?;
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let stdout = self.interp.take_stdout();
        let stderr = failure.unwrap_or_default();
        let outcome = self.session.finish_run(&stdout, &stderr)?;

        let updated = self.symbol_names(&outcome.updated);
        let waiting = self.symbol_names(&outcome.propagation.marked_waiting);
        self.interp.sweep(&mut self.session);

        Ok(RunReport {
            cell: id,
            counter,
            stdout,
            stderr,
            updated,
            waiting,
        })
    }

    /// Run every registered cell in position order, stopping after the
    /// first cell that hits a runtime error.
    pub fn run_all(&mut self) -> Result<Vec<RunReport>, HostError> {
        let mut order: Vec<(u64, CellId)> = Vec::new();
        for id in self.programs.keys() {
            order.push((self.session.cell(*id)?.position, *id));
        }
        order.sort_unstable();

        let mut reports = Vec::with_capacity(order.len());
        for (_, id) in order {
            let report = self.run_cell(id)?;
            let clean = report.clean();
            reports.push(report);
            if !clean {
                break;
            }
        }
        Ok(reports)
    }

    /// Per-cell staleness reports.
    #[must_use]
    pub fn reports(&self) -> Vec<CellReport> {
        self.session.reports()
    }

    fn symbol_names(&self, ids: &BTreeSet<SymbolId>) -> Vec<String> {
        let mut names: Vec<String> = ids
            .iter()
            .filter_map(|id| self.session.graph().symbol(*id).ok())
            .map(|s| s.name.display())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use freshet_core::{CellStatus, SymbolStatus};

    fn booted(script: &str) -> Notebook {
        let mut nb = Notebook::new(SessionConfig::default());
        let ids = nb.load_script(script).expect("load");
        for id in ids {
            let report = nb.run_cell(id).expect("run");
            assert!(report.clean(), "cell {} failed: {}", id.0, report.stderr);
        }
        nb
    }

    #[test]
    fn load_script_registers_cells_in_order() {
        let mut nb = Notebook::new(SessionConfig::default());
        let ids = nb
            .load_script("# %%\nx = 1\n# %%\ny = x + 1\n")
            .expect("load");
        assert_eq!(ids, vec![CellId(1), CellId(2)]);
        assert_eq!(nb.session().cell(CellId(1)).expect("cell 1").position, 1);
        assert_eq!(nb.session().cell(CellId(2)).expect("cell 2").position, 2);
    }

    #[test]
    fn run_all_executes_and_reports_fresh() {
        let mut nb = Notebook::new(SessionConfig::default());
        nb.load_script("# %%\nx = 1\n# %%\ny = x + 1\nprint(y)\n")
            .expect("load");
        let runs = nb.run_all().expect("run all");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].stdout, "2\n");
        assert!(nb.reports().iter().all(|r| r.status == CellStatus::Fresh));
    }

    #[test]
    fn rerunning_a_producer_marks_the_consumer() {
        let mut nb = booted("# %%\nx = 1\n# %%\ny = x + 1\n");
        nb.run_cell(CellId(1)).expect("rerun");
        let reports = nb.reports();
        assert_eq!(reports[0].status, CellStatus::Fresh);
        assert_eq!(reports[1].status, CellStatus::Stale);
        assert_eq!(reports[1].stale_inputs, vec!["x".to_string()]);
    }

    #[test]
    fn runtime_errors_keep_earlier_statements() {
        let mut nb = Notebook::new(SessionConfig::default());
        nb.load_script("# %%\nx = 1\ny = missing\nz = 3\n")
            .expect("load");
        let report = nb.run_cell(CellId(1)).expect("run");
        assert!(!report.clean());
        assert!(report.stderr.contains("missing"));
        // x committed before the failure; z never ran
        assert!(nb.session().symbol_named("x").is_some());
        assert!(nb.session().symbol_named("z").is_none());
    }

    #[test]
    fn run_all_stops_at_the_failing_cell() {
        let mut nb = Notebook::new(SessionConfig::default());
        nb.load_script("# %%\nx = boom\n# %%\ny = 2\n").expect("load");
        let runs = nb.run_all().expect("run all");
        assert_eq!(runs.len(), 1);
        assert!(!runs[0].clean());
    }

    #[test]
    fn edits_change_the_program_and_the_report() {
        let mut nb = booted("# %%\nx = 1\n");
        let outcome = nb
            .register_cell(CellId(1), None, "x = 2\n")
            .expect("edit");
        assert!(outcome.changed);
        assert_eq!(nb.reports()[0].status, CellStatus::Stale);

        let report = nb.run_cell(CellId(1)).expect("rerun");
        assert_eq!(report.updated, vec!["x".to_string()]);
        assert_eq!(nb.reports()[0].status, CellStatus::Fresh);
    }

    #[test]
    fn aliased_containers_share_identity_across_cells() {
        let mut nb = booted(
            "# %%\nxs = [1, 2]\n# %%\nys = xs\n# %%\nhead = xs[0]\n# %%\nys.append(3)\n",
        );
        // The append lands on the one shared identity; the element reader
        // is untouched because xs[0] itself never changed
        let graph = nb.session().graph();
        let head = nb.session().symbol_named("head").expect("head");
        assert_eq!(
            graph.symbol(head).expect("head symbol").status(),
            SymbolStatus::Fresh,
        );
        let xs = nb.session().symbol_named("xs").expect("xs");
        let ys = nb.session().symbol_named("ys").expect("ys");
        let xs_obj = graph.symbol(xs).expect("xs symbol").obj.id;
        let ys_obj = graph.symbol(ys).expect("ys symbol").obj.id;
        assert_eq!(xs_obj, ys_obj);
        assert_eq!(graph.namespace_children(xs_obj).len(), 3);
    }
}
