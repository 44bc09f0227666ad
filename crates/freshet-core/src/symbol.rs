//! # Symbols and Dependency Edges
//!
//! A [`Symbol`] is the tracked unit of data dependency: a name bound in a
//! scope, or an element inside a container namespace. The symbol is a stable
//! handle; the value it holds changes across reassignment, and its histories
//! record when it was updated and when (and at which value version) it was
//! used.
//!
//! Edges live on the symbols themselves: `parents` are the symbols the last
//! updates read from, `children` the symbols that read from this one. Each
//! edge family is kept per [`DepContext`], giving the four logical edge sets
//! (parents/children x dynamic/static). The graph keeps the two sides
//! symmetric.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{DepContext, ObjectRef, ScopeId, SymbolFlags, SymbolId, SymbolName, Timestamp};

// =============================================================================
// STATUS
// =============================================================================

/// Freshness of a symbol relative to the most recent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    /// Current value reflects all of its current dependencies.
    Fresh,
    /// At least one dependency has a newer timestamp; the owning cell has
    /// not re-run yet.
    Waiting,
    /// A dependency could not be resolved or propagation hit an anomaly.
    /// Never silently treated as fresh.
    Unknown,
}

// =============================================================================
// EDGE SET
// =============================================================================

/// One edge family (parents or children) partitioned by dependency context.
///
/// For a parent family, the timestamp set under a parent id holds THIS
/// symbol's update timestamps at which that parent was read. For a child
/// family, the set under a child id holds the CHILD's update timestamps.
/// Either way the timestamps belong to the dependent side of the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EdgeSet {
    maps: [BTreeMap<SymbolId, BTreeSet<Timestamp>>; 2],
}

impl EdgeSet {
    /// Create an empty edge set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The edges recorded under one context.
    #[must_use]
    pub fn in_context(&self, ctx: DepContext) -> &BTreeMap<SymbolId, BTreeSet<Timestamp>> {
        &self.maps[ctx.index()]
    }

    /// Record an edge to `other` at `ts` under `ctx`.
    pub fn record(&mut self, ctx: DepContext, other: SymbolId, ts: Timestamp) {
        self.maps[ctx.index()].entry(other).or_default().insert(ts);
    }

    /// Drop every edge touching `other` (both contexts). Used by garbage
    /// collection when the counterpart symbol is physically removed.
    pub fn forget(&mut self, other: SymbolId) {
        for ctx in DepContext::ALL {
            self.maps[ctx.index()].remove(&other);
        }
    }

    /// Symbols with at least one edge in `ctx` at exactly `ts`.
    #[must_use]
    pub fn at(&self, ctx: DepContext, ts: Timestamp) -> Vec<SymbolId> {
        self.in_context(ctx)
            .iter()
            .filter(|(_, times)| times.contains(&ts))
            .map(|(sym, _)| *sym)
            .collect()
    }

    /// Whether no edges exist in either context.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(BTreeMap::is_empty)
    }

    /// Total number of `(symbol, timestamp)` pairs across both contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps
            .iter()
            .flat_map(|m| m.values())
            .map(BTreeSet::len)
            .sum()
    }
}

// =============================================================================
// USAGE RECORD
// =============================================================================

/// One observed use of a symbol.
///
/// Invariant: `value_ts <= used_at` — a read can never observe a future
/// write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Timestamp of the statement that performed the read.
    pub used_at: Timestamp,
    /// The symbol's latest update timestamp at the moment of the read.
    pub value_ts: Timestamp,
}

// =============================================================================
// SYMBOL
// =============================================================================

/// The tracked entity: a binding with identity, histories, and edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Stable handle, persists across reassignment.
    pub id: SymbolId,
    /// Binding name within the owning scope (re-indexable for elements).
    pub name: SymbolName,
    /// The scope binding this symbol.
    pub scope: ScopeId,
    /// Identity of the value currently held.
    pub obj: ObjectRef,
    /// Host-observed classification.
    pub flags: SymbolFlags,
    /// Update history, strictly increasing.
    pub updated_timestamps: Vec<Timestamp>,
    /// Usage history in observation order.
    pub usages: Vec<UsageRecord>,
    /// Symbols the updates of this one read from.
    pub parents: EdgeSet,
    /// Symbols that read from this one.
    pub children: EdgeSet,
    /// Newest parent update this symbol has not yet absorbed. Drives the
    /// waiting state; propagation raises it, a fresh update catches up.
    pub required_ts: Timestamp,
    /// Conservative marker: some dependency of the last update could not be
    /// resolved.
    pub unknown_deps: bool,
    /// Unbound but retained because graph edges still reference it.
    pub tombstone: bool,
    /// Host-supplied type annotation string, for metadata export.
    pub type_note: Option<String>,
    /// Module path this symbol was imported from, if any.
    pub import_origin: Option<String>,
}

impl Symbol {
    /// Create a symbol at its first binding. No update is recorded yet.
    #[must_use]
    pub fn new(
        id: SymbolId,
        name: SymbolName,
        scope: ScopeId,
        obj: ObjectRef,
        flags: SymbolFlags,
    ) -> Self {
        Self {
            id,
            name,
            scope,
            obj,
            flags,
            updated_timestamps: Vec::new(),
            usages: Vec::new(),
            parents: EdgeSet::new(),
            children: EdgeSet::new(),
            required_ts: Timestamp::UNINITIALIZED,
            unknown_deps: false,
            tombstone: false,
            type_note: None,
            import_origin: None,
        }
    }

    /// Latest update timestamp, or the sentinel before the first update.
    #[must_use]
    pub fn updated_ts(&self) -> Timestamp {
        self.updated_timestamps
            .last()
            .copied()
            .unwrap_or(Timestamp::UNINITIALIZED)
    }

    /// Latest usage timestamp, or the sentinel if never used.
    #[must_use]
    pub fn live_use_ts(&self) -> Timestamp {
        self.usages
            .last()
            .map_or(Timestamp::UNINITIALIZED, |u| u.used_at)
    }

    /// Append an update at `ts` holding `obj`.
    ///
    /// Returns `false` (and records nothing) if `ts` does not advance the
    /// history; the caller decides whether to log the anomaly.
    pub fn record_update(&mut self, ts: Timestamp, obj: ObjectRef) -> bool {
        if ts <= self.updated_ts() {
            return false;
        }
        self.updated_timestamps.push(ts);
        self.obj = obj;
        self.tombstone = false;
        true
    }

    /// Record a read of this symbol by the statement at `used_at`.
    pub fn record_usage(&mut self, used_at: Timestamp) {
        self.usages.push(UsageRecord {
            used_at,
            value_ts: self.updated_ts(),
        });
    }

    /// Raise the required timestamp (a parent updated at `origin`).
    pub fn mark_waiting(&mut self, origin: Timestamp) {
        if origin > self.required_ts {
            self.required_ts = origin;
        }
    }

    /// Freshness relative to the most recent execution.
    #[must_use]
    pub fn status(&self) -> SymbolStatus {
        if self.unknown_deps {
            SymbolStatus::Unknown
        } else if self.required_ts > self.updated_ts() {
            SymbolStatus::Waiting
        } else {
            SymbolStatus::Fresh
        }
    }

    /// Latest update at or before `ts`, if any.
    #[must_use]
    pub fn update_at_or_before(&self, ts: Timestamp) -> Option<Timestamp> {
        match self.updated_timestamps.binary_search(&ts) {
            Ok(i) => Some(self.updated_timestamps[i]),
            Err(0) => None,
            Err(i) => Some(self.updated_timestamps[i - 1]),
        }
    }

    /// Latest update strictly before `ts`, if any.
    ///
    /// This is the version a read at `ts` observed: reads see pre-statement
    /// state, so the producing update is strictly earlier.
    #[must_use]
    pub fn update_before(&self, ts: Timestamp) -> Option<Timestamp> {
        match self.updated_timestamps.binary_search(&ts) {
            Ok(0) | Err(0) => None,
            Ok(i) | Err(i) => Some(self.updated_timestamps[i - 1]),
        }
    }

    /// The update following `ts`, if any. Bounds forward-slice windows.
    #[must_use]
    pub fn update_after(&self, ts: Timestamp) -> Option<Timestamp> {
        match self.updated_timestamps.binary_search(&ts) {
            Ok(i) => self.updated_timestamps.get(i + 1).copied(),
            Err(i) => self.updated_timestamps.get(i).copied(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;

    fn sym() -> Symbol {
        Symbol::new(
            SymbolId(1),
            SymbolName::name("x"),
            ScopeId(0),
            ObjectRef::new(ObjectId(100), 0),
            SymbolFlags::default(),
        )
    }

    #[test]
    fn update_history_strictly_increasing() {
        let mut s = sym();
        assert!(s.record_update(Timestamp::new(1, 0), ObjectRef::new(ObjectId(100), 0)));
        assert!(s.record_update(Timestamp::new(1, 1), ObjectRef::new(ObjectId(101), 0)));

        // Same or earlier timestamp is refused
        assert!(!s.record_update(Timestamp::new(1, 1), ObjectRef::new(ObjectId(102), 0)));
        assert!(!s.record_update(Timestamp::new(0, 5), ObjectRef::new(ObjectId(103), 0)));

        assert_eq!(s.updated_timestamps.len(), 2);
        assert_eq!(s.updated_ts(), Timestamp::new(1, 1));
        assert_eq!(s.obj, ObjectRef::new(ObjectId(101), 0));
    }

    #[test]
    fn usage_never_observes_future_write() {
        let mut s = sym();
        s.record_update(Timestamp::new(1, 0), ObjectRef::new(ObjectId(100), 0));
        s.record_usage(Timestamp::new(2, 0));

        let usage = s.usages.last().expect("usage recorded");
        assert_eq!(usage.used_at, Timestamp::new(2, 0));
        assert_eq!(usage.value_ts, Timestamp::new(1, 0));
        assert!(usage.value_ts <= usage.used_at);
        assert_eq!(s.live_use_ts(), Timestamp::new(2, 0));
    }

    #[test]
    fn waiting_then_fresh_after_catchup() {
        let mut s = sym();
        s.record_update(Timestamp::new(1, 0), ObjectRef::new(ObjectId(100), 0));
        assert_eq!(s.status(), SymbolStatus::Fresh);

        s.mark_waiting(Timestamp::new(3, 0));
        assert_eq!(s.status(), SymbolStatus::Waiting);

        // Re-running the owning statement past the requirement restores fresh
        s.record_update(Timestamp::new(4, 0), ObjectRef::new(ObjectId(104), 0));
        assert_eq!(s.status(), SymbolStatus::Fresh);
    }

    #[test]
    fn unknown_wins_over_waiting() {
        let mut s = sym();
        s.record_update(Timestamp::new(1, 0), ObjectRef::new(ObjectId(100), 0));
        s.unknown_deps = true;
        s.mark_waiting(Timestamp::new(2, 0));
        assert_eq!(s.status(), SymbolStatus::Unknown);
    }

    #[test]
    fn update_lookup_bounds() {
        let mut s = sym();
        for (cell, stmt) in [(1, 0), (3, 2), (5, 1)] {
            s.record_update(Timestamp::new(cell, stmt), ObjectRef::new(ObjectId(100), 0));
        }

        assert_eq!(
            s.update_at_or_before(Timestamp::new(3, 2)),
            Some(Timestamp::new(3, 2))
        );
        assert_eq!(
            s.update_before(Timestamp::new(3, 2)),
            Some(Timestamp::new(1, 0))
        );
        assert_eq!(s.update_before(Timestamp::new(1, 0)), None);
        assert_eq!(
            s.update_after(Timestamp::new(3, 2)),
            Some(Timestamp::new(5, 1))
        );
        assert_eq!(s.update_after(Timestamp::new(5, 1)), None);
        assert_eq!(
            s.update_at_or_before(Timestamp::new(9, 9)),
            Some(Timestamp::new(5, 1))
        );
        assert_eq!(s.update_at_or_before(Timestamp::UNINITIALIZED), None);
    }

    #[test]
    fn edge_set_symmetry_material() {
        let mut edges = EdgeSet::new();
        edges.record(DepContext::Dynamic, SymbolId(2), Timestamp::new(1, 0));
        edges.record(DepContext::Dynamic, SymbolId(2), Timestamp::new(2, 0));
        edges.record(DepContext::Static, SymbolId(3), Timestamp::new(2, 0));

        assert_eq!(edges.len(), 3);
        assert_eq!(
            edges.at(DepContext::Dynamic, Timestamp::new(2, 0)),
            vec![SymbolId(2)]
        );
        assert_eq!(
            edges.at(DepContext::Static, Timestamp::new(2, 0)),
            vec![SymbolId(3)]
        );

        edges.forget(SymbolId(2));
        assert_eq!(edges.len(), 1);
        assert!(!edges.is_empty());
    }
}
