//! # Staleness Propagation & Cell Readiness
//!
//! After a cell run commits, every symbol it updated pushes a waiting mark
//! down its dynamic dependents: a dependent whose own latest update predates
//! the origin update is no longer looking at current inputs. Propagation is
//! budgeted; on exhaustion the unexplored frontier is marked unknown rather
//! than failing the run.
//!
//! Cell readiness turns symbol freshness into re-run offers under a
//! configured schedule:
//!
//! - `Liveness` — offer any stale cell whose inputs are all fresh.
//! - `Dag` — additionally hold a cell back while the cell that defined one
//!   of its stale inputs is itself stale.
//! - `Hybrid` — dag ordering; if dag ordering deadlocks (every stale cell
//!   blocked), fall back to liveness offers.
//! - `Strict` — report freshness, never offer.
//!
//! Under `InOrder` flow a cell consuming a symbol defined by a
//! later-positioned cell is flagged and withheld from offers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::cell::{Cell, Execution};
use crate::graph::SymbolGraph;
use crate::primitives::MAX_PROPAGATION_VISITS;
use crate::symbol::SymbolStatus;
use crate::types::{CellId, DepContext, SymbolId, Timestamp};

// =============================================================================
// PROPAGATION
// =============================================================================

/// What one propagation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropagationSummary {
    /// Symbols visited across all origins.
    pub visited: usize,
    /// Symbols newly marked waiting.
    pub marked_waiting: BTreeSet<SymbolId>,
    /// Symbols marked unknown because the visit budget ran out.
    pub marked_unknown: BTreeSet<SymbolId>,
    /// Whether the visit budget ran out.
    pub budget_exhausted: bool,
}

/// Push waiting marks from every symbol `updated` by a finished run.
///
/// Traversal follows dynamic child edges breadth-first. A dependent that
/// already refreshed itself after the origin update is skipped, and the
/// origin timestamp rides along unchanged so transitive dependents compare
/// against the update that actually made them stale.
pub fn propagate_updates(
    graph: &mut SymbolGraph,
    updated: &BTreeSet<SymbolId>,
) -> PropagationSummary {
    propagate_with_budget(graph, updated, MAX_PROPAGATION_VISITS)
}

fn propagate_with_budget(
    graph: &mut SymbolGraph,
    updated: &BTreeSet<SymbolId>,
    mut budget: usize,
) -> PropagationSummary {
    let mut summary = PropagationSummary::default();

    for origin in updated {
        let Ok(symbol) = graph.symbol(*origin) else {
            continue;
        };
        let origin_ts = symbol.updated_ts();
        if !origin_ts.is_initialized() {
            continue;
        }

        let mut visited = BTreeSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(*origin);
        visited.insert(*origin);

        while let Some(current) = frontier.pop_front() {
            if budget == 0 {
                // Out of budget: the dequeued symbol and everything still
                // queued are discovered but unexpanded, so they end up in an
                // unknown state rather than silently fresh
                for sym in std::iter::once(current).chain(frontier.drain(..)) {
                    if let Ok(s) = graph.symbol_mut(sym) {
                        s.unknown_deps = true;
                        summary.marked_unknown.insert(sym);
                    }
                }
                summary.budget_exhausted = true;
                break;
            }
            budget -= 1;
            summary.visited += 1;

            let children: Vec<SymbolId> = match graph.symbol(current) {
                Ok(s) => s
                    .children
                    .in_context(DepContext::Dynamic)
                    .keys()
                    .copied()
                    .collect(),
                Err(_) => continue,
            };
            for child in children {
                if !visited.insert(child) {
                    continue;
                }
                let Ok(s) = graph.symbol_mut(child) else {
                    continue;
                };
                if child == *origin || s.updated_ts() >= origin_ts {
                    continue;
                }
                s.mark_waiting(origin_ts);
                summary.marked_waiting.insert(child);
                frontier.push_back(child);
            }
        }
    }
    summary
}

// =============================================================================
// SCHEDULES
// =============================================================================

/// How re-run offers are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSchedule {
    /// Offer stale cells whose inputs are all fresh.
    #[default]
    Liveness,
    /// Hold cells back until their stale inputs' defining cells re-ran.
    Dag,
    /// Dag ordering with a liveness fallback when dag ordering deadlocks.
    Hybrid,
    /// Report freshness only; never offer.
    Strict,
}

/// Whether dataflow may run against notebook order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowOrder {
    /// Any cell may consume any other cell's outputs.
    #[default]
    AnyOrder,
    /// A cell consuming a later-positioned cell's outputs is withheld.
    InOrder,
}

/// Freshness of one cell relative to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Inputs unchanged since the last run.
    Fresh,
    /// Some input updated after the last run (or the cell never ran).
    Stale,
    /// Some input is itself waiting or unknown; re-running now would
    /// consume a value that is not current.
    Waiting,
}

/// Per-cell freshness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellReport {
    /// The cell.
    pub cell: CellId,
    /// Notebook position.
    pub position: u64,
    /// Latest execution counter, `None` if never run.
    pub exec_count: Option<u64>,
    /// Freshness classification.
    pub status: CellStatus,
    /// Whether the schedule offers this cell for re-run.
    pub ready: bool,
    /// Set under `InOrder` flow when an input comes from a later cell.
    pub forward_only: bool,
    /// Display names of the inputs that made the cell stale or waiting.
    pub stale_inputs: Vec<String>,
}

struct CellAnalysis {
    status: CellStatus,
    forward_only: bool,
    stale_inputs: Vec<String>,
    blocking: BTreeSet<CellId>,
}

/// Compute freshness and re-run offers for every cell.
#[must_use]
pub fn cell_reports(
    graph: &SymbolGraph,
    cells: &BTreeMap<CellId, Cell>,
    executions: &BTreeMap<u64, Execution>,
    schedule: ExecutionSchedule,
    flow_order: FlowOrder,
) -> Vec<CellReport> {
    let mut analyses: BTreeMap<CellId, CellAnalysis> = BTreeMap::new();
    for cell in cells.values() {
        analyses.insert(cell.id, analyze_cell(graph, cell, cells, executions, flow_order));
    }

    let offers = compute_offers(&analyses, schedule);

    cells
        .values()
        .map(|cell| {
            let analysis = &analyses[&cell.id];
            CellReport {
                cell: cell.id,
                position: cell.position,
                exec_count: cell.exec_count,
                status: analysis.status,
                ready: offers.contains(&cell.id),
                forward_only: analysis.forward_only,
                stale_inputs: analysis.stale_inputs.clone(),
            }
        })
        .collect()
}

fn analyze_cell(
    graph: &SymbolGraph,
    cell: &Cell,
    cells: &BTreeMap<CellId, Cell>,
    executions: &BTreeMap<u64, Execution>,
    flow_order: FlowOrder,
) -> CellAnalysis {
    let inputs: BTreeSet<SymbolId> = match cell.exec_count {
        Some(counter) => executions
            .get(&counter)
            .map(Execution::all_used)
            .unwrap_or_default(),
        None => cell.static_uses.clone(),
    };

    let last_run = cell.exec_count.map_or(-1, |c| c as i64);
    let mut status = if cell.exec_count.is_none() || cell.dirty {
        CellStatus::Stale
    } else {
        CellStatus::Fresh
    };
    let mut stale_inputs = Vec::new();
    let mut forward_only = false;
    let mut blocking = BTreeSet::new();

    for input in &inputs {
        let Ok(symbol) = graph.symbol(*input) else {
            continue;
        };
        let updated = symbol.updated_ts();
        let input_fresh = symbol.status() == SymbolStatus::Fresh && !symbol.tombstone;

        if !input_fresh {
            status = CellStatus::Waiting;
            stale_inputs.push(symbol.name.display());
        } else if updated.cell > last_run {
            if status != CellStatus::Waiting {
                status = CellStatus::Stale;
            }
            stale_inputs.push(symbol.name.display());
        }

        // Who produced the value this cell would consume
        if let Some(def_cell) = defining_cell(executions, updated) {
            if updated.cell > last_run {
                blocking.insert(def_cell);
            }
            if flow_order == FlowOrder::InOrder {
                if let Some(def) = cells.get(&def_cell) {
                    if def.position > cell.position {
                        forward_only = true;
                    }
                }
            }
        }
    }

    stale_inputs.sort();
    stale_inputs.dedup();
    CellAnalysis {
        status,
        forward_only,
        stale_inputs,
        blocking,
    }
}

fn defining_cell(executions: &BTreeMap<u64, Execution>, ts: Timestamp) -> Option<CellId> {
    if ts.cell < 0 {
        return None;
    }
    executions.get(&(ts.cell as u64)).map(|e| e.cell)
}

/// Offers under the configured schedule. Dag ordering holds a stale cell
/// back while any blocking cell is itself stale; hybrid retries with
/// liveness when that ordering offers nothing at all.
fn compute_offers(
    analyses: &BTreeMap<CellId, CellAnalysis>,
    schedule: ExecutionSchedule,
) -> BTreeSet<CellId> {
    if schedule == ExecutionSchedule::Strict {
        return BTreeSet::new();
    }

    let liveness: BTreeSet<CellId> = analyses
        .iter()
        .filter(|(_, a)| a.status == CellStatus::Stale && !a.forward_only)
        .map(|(id, _)| *id)
        .collect();

    match schedule {
        ExecutionSchedule::Liveness | ExecutionSchedule::Strict => liveness,
        ExecutionSchedule::Dag | ExecutionSchedule::Hybrid => {
            let dag: BTreeSet<CellId> = liveness
                .iter()
                .copied()
                .filter(|id| {
                    analyses[id].blocking.iter().all(|b| {
                        *b == *id
                            || analyses
                                .get(b)
                                .is_none_or(|a| a.status != CellStatus::Stale)
                    })
                })
                .collect();
            if dag.is_empty() && schedule == ExecutionSchedule::Hybrid && !liveness.is_empty() {
                liveness
            } else {
                dag
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
