//! # Program Slicing
//!
//! A backward slice answers "which statements produced this value": starting
//! from a symbol's update, walk parent edges transitively and emit every
//! contributing statement once, in execution order. A forward slice answers
//! the dual "which statements consumed this value".
//!
//! ## Termination
//!
//! The backward walk maps each parent edge at timestamp `t` to the parent's
//! latest update STRICTLY before `t`. Writes commit at the statement's own
//! timestamp while reads see pre-statement values, so strictly-before is
//! both the correct value version and a strictly decreasing measure; cycles
//! through self-referencing statements cannot loop.
//!
//! The forward walk is bounded per hop by the source's next update: a child
//! edge later than that read a newer version and does not belong to this
//! update's cone.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::cell::Execution;
use crate::graph::SymbolGraph;
use crate::primitives::MAX_SLICE_STATEMENTS;
use crate::symbol::Symbol;
use crate::types::{CellId, DepContext, FreshetError, SymbolId, Timestamp};

// =============================================================================
// POLICY & RESULTS
// =============================================================================

/// Which edge context a slice follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Dynamic edges, falling back to static edges where a statement has
    /// no dynamic record.
    #[default]
    PreferDynamic,
    /// Dynamic edges only.
    DynamicOnly,
    /// Static edges only.
    StaticOnly,
}

/// One statement of a slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceLine {
    /// When the statement ran.
    pub ts: Timestamp,
    /// The cell it belonged to, if the run was recorded.
    pub cell: Option<CellId>,
    /// Statement source, or a placeholder for unrecorded runs.
    pub source: String,
}

/// An ordered, deduplicated set of statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    /// The symbol the slice was taken from.
    pub target: SymbolId,
    /// Statements in execution order, each exactly once.
    pub lines: Vec<SliceLine>,
}

impl Slice {
    /// The slice as runnable source, one statement per line.
    #[must_use]
    pub fn code(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.source);
            out.push('\n');
        }
        out
    }

    /// Statement timestamps in order.
    #[must_use]
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.lines.iter().map(|l| l.ts).collect()
    }
}

// =============================================================================
// SLICER
// =============================================================================

/// Slices a session's history without mutating it.
#[derive(Debug, Clone, Copy)]
pub struct Slicer<'a> {
    graph: &'a SymbolGraph,
    executions: &'a BTreeMap<u64, Execution>,
    policy: ContextPolicy,
}

impl<'a> Slicer<'a> {
    /// A slicer over `graph` and `executions` preferring dynamic edges.
    #[must_use]
    pub fn new(graph: &'a SymbolGraph, executions: &'a BTreeMap<u64, Execution>) -> Self {
        Self {
            graph,
            executions,
            policy: ContextPolicy::PreferDynamic,
        }
    }

    /// The same slicer under a different context policy.
    #[must_use]
    pub fn with_policy(self, policy: ContextPolicy) -> Self {
        Self { policy, ..self }
    }

    /// The statements that produced `target`'s value.
    ///
    /// `at` selects the update to slice from: the latest one at or before
    /// `at`, or the latest overall when `None`. A symbol with no update in
    /// range is a [`FreshetError::TimestampNotFound`].
    pub fn backward(
        &self,
        target: SymbolId,
        at: Option<Timestamp>,
    ) -> Result<Slice, FreshetError> {
        let start = self.anchor(target, at)?;
        let mut visited: BTreeSet<(SymbolId, Timestamp)> = BTreeSet::new();
        let mut emitted: BTreeSet<Timestamp> = BTreeSet::new();
        let mut work = VecDeque::new();
        visited.insert((target, start));
        work.push_back((target, start));

        while let Some((sym, ts)) = work.pop_front() {
            emitted.insert(ts);
            if emitted.len() > MAX_SLICE_STATEMENTS {
                return Err(FreshetError::LimitExceeded(format!(
                    "slice exceeds {MAX_SLICE_STATEMENTS} statements"
                )));
            }
            let symbol = self.graph.symbol(sym)?;
            for parent in self.backward_links(symbol, ts) {
                let Ok(p) = self.graph.symbol(parent) else {
                    continue;
                };
                // The value read at `ts` is the parent's latest update
                // strictly before `ts`
                let Some(pt) = p.update_before(ts) else {
                    continue;
                };
                if visited.insert((parent, pt)) {
                    work.push_back((parent, pt));
                }
            }
        }
        Ok(self.render(target, emitted))
    }

    /// The statements that consumed `target`'s value, beginning with the
    /// update itself.
    pub fn forward(
        &self,
        target: SymbolId,
        from: Option<Timestamp>,
    ) -> Result<Slice, FreshetError> {
        let start = self.anchor(target, from)?;
        let mut visited: BTreeSet<(SymbolId, Timestamp)> = BTreeSet::new();
        let mut emitted: BTreeSet<Timestamp> = BTreeSet::new();
        let mut work = VecDeque::new();
        visited.insert((target, start));
        work.push_back((target, start));

        while let Some((sym, ts)) = work.pop_front() {
            emitted.insert(ts);
            if emitted.len() > MAX_SLICE_STATEMENTS {
                return Err(FreshetError::LimitExceeded(format!(
                    "slice exceeds {MAX_SLICE_STATEMENTS} statements"
                )));
            }
            let symbol = self.graph.symbol(sym)?;
            let upper = symbol.update_after(ts);
            for (child, ct) in self.forward_links(symbol, ts, upper) {
                if visited.insert((child, ct)) {
                    work.push_back((child, ct));
                }
            }
        }
        Ok(self.render(target, emitted))
    }

    fn anchor(&self, target: SymbolId, at: Option<Timestamp>) -> Result<Timestamp, FreshetError> {
        let symbol = self.graph.symbol(target)?;
        let start = match at {
            Some(ts) => symbol.update_at_or_before(ts),
            None => {
                let latest = symbol.updated_ts();
                latest.is_initialized().then_some(latest)
            }
        };
        start.ok_or_else(|| {
            let probe = at.unwrap_or(Timestamp::UNINITIALIZED);
            FreshetError::TimestampNotFound(probe.cell, probe.stmt)
        })
    }

    fn backward_links(&self, symbol: &Symbol, ts: Timestamp) -> Vec<SymbolId> {
        match self.policy {
            ContextPolicy::PreferDynamic => {
                let dynamic = symbol.parents.at(DepContext::Dynamic, ts);
                if dynamic.is_empty() {
                    symbol.parents.at(DepContext::Static, ts)
                } else {
                    dynamic
                }
            }
            ContextPolicy::DynamicOnly => symbol.parents.at(DepContext::Dynamic, ts),
            ContextPolicy::StaticOnly => symbol.parents.at(DepContext::Static, ts),
        }
    }

    /// Child edges in `(from, upper]`: reads of this value version.
    ///
    /// An edge exactly at `upper` was committed by the statement that next
    /// rewrote the source, whose reads still saw this version.
    fn forward_links(
        &self,
        symbol: &Symbol,
        from: Timestamp,
        upper: Option<Timestamp>,
    ) -> Vec<(SymbolId, Timestamp)> {
        let in_window = |ctx: DepContext| -> Vec<(SymbolId, Timestamp)> {
            symbol
                .children
                .in_context(ctx)
                .iter()
                .flat_map(|(child, stamps)| {
                    stamps
                        .iter()
                        .copied()
                        .filter(|t| *t > from && upper.is_none_or(|u| *t <= u))
                        .map(|t| (*child, t))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        match self.policy {
            ContextPolicy::PreferDynamic => {
                let dynamic = in_window(DepContext::Dynamic);
                if dynamic.is_empty() {
                    in_window(DepContext::Static)
                } else {
                    dynamic
                }
            }
            ContextPolicy::DynamicOnly => in_window(DepContext::Dynamic),
            ContextPolicy::StaticOnly => in_window(DepContext::Static),
        }
    }

    fn render(&self, target: SymbolId, emitted: BTreeSet<Timestamp>) -> Slice {
        let lines = emitted
            .into_iter()
            .map(|ts| {
                let recorded = if ts.cell >= 0 {
                    self.executions.get(&(ts.cell as u64)).and_then(|e| {
                        e.source_at(ts).map(|s| (e.cell, s.to_string()))
                    })
                } else {
                    None
                };
                match recorded {
                    Some((cell, source)) => SliceLine {
                        ts,
                        cell: Some(cell),
                        source,
                    },
                    None => SliceLine {
                        ts,
                        cell: None,
                        source: format!("# statement {}:{} not recorded", ts.cell, ts.stmt),
                    },
                }
            })
            .collect();
        Slice { target, lines }
    }
}

// =============================================================================
// TESTS
// =============================================================================
