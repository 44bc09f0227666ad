//! # Symbol Graph
//!
//! The single shared mutable resource of a session: scopes, symbols, the
//! identity side table, and every dependency edge. The graph is owned
//! exclusively by the session and mutated only through the tracer and the
//! propagator; hosts never touch it directly.
//!
//! ## Structure
//!
//! - `scopes` — lexical scopes and container namespaces, arena-keyed.
//! - `symbols` — every symbol ever created, arena-keyed. Unbound symbols are
//!   tombstoned, not removed, so historical edges stay resolvable.
//! - `identities` — side table keyed by host object identity, carrying a
//!   generation counter, the alias symbols currently holding the value, and
//!   the element namespace if the value is a container. A bumped generation
//!   makes stale [`ObjectRef`]s fail resolution instead of attaching edges
//!   to an unrelated value.
//!
//! ## Determinism
//!
//! BTreeMap/BTreeSet only. Iteration order, and therefore every derived
//! artifact (reports, slices, snapshots), is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::scope::{Scope, ScopeKind};
use crate::symbol::Symbol;
use crate::types::{
    ContainerKind, DepContext, FreshetError, ObjectId, ObjectRef, ScopeId, SymbolFlags, SymbolId,
    SymbolName, Timestamp,
};

// =============================================================================
// CONTAINER OPERATIONS
// =============================================================================

/// A structural mutation of a container, as observed by the tracer or
/// derived from an external-call effect.
///
/// Positional operations re-index `List` namespaces: insert/remove shift the
/// bindings at higher positions while PRESERVING the identity of every
/// unaffected element symbol. Only the removed element is tombstoned; no new
/// symbols are fabricated for positions whose value did not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerOp {
    /// Append a new element at the end of a list.
    Append {
        /// Identity of the appended value.
        obj: ObjectId,
    },
    /// Insert a new element at `index`, shifting later positions up.
    Insert {
        /// Position of the new element.
        index: i64,
        /// Identity of the inserted value.
        obj: ObjectId,
    },
    /// Remove the element at `index` (negative counts from the end),
    /// shifting later positions down.
    RemoveAt {
        /// Position to remove.
        index: i64,
    },
    /// Remove the first element holding `obj`.
    RemoveValue {
        /// Identity of the value to remove.
        obj: ObjectId,
    },
    /// Bind or rebind a map key.
    SetKey {
        /// The key.
        key: String,
        /// Identity of the new value.
        obj: ObjectId,
    },
    /// Remove a map key.
    DelKey {
        /// The key.
        key: String,
    },
    /// Remove every element.
    Clear,
    /// Append every element of another list.
    ExtendFrom {
        /// Identity of the source list.
        source: ObjectId,
    },
    /// Standard mutation: the element set is invalidated wholesale. Every
    /// child is re-timestamped in place with the mutating statement as its
    /// parent set and marked unknown-deps; identities are kept.
    Overwrite,
}

// =============================================================================
// IDENTITY SIDE TABLE
// =============================================================================

/// Side-table entry for one host object identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IdentityEntry {
    /// Bumped whenever the host reports the identity discarded; stale
    /// [`ObjectRef`]s then stop resolving.
    pub generation: u64,
    /// Symbols currently holding this value.
    pub aliases: BTreeSet<SymbolId>,
    /// Element namespace, if the value is a container.
    pub namespace: Option<ScopeId>,
}

// =============================================================================
// GRAPH COUNTS
// =============================================================================

/// Size counters for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GraphCounts {
    /// Live (non-tombstoned) symbols.
    pub symbols: u64,
    /// Tombstoned symbols retained for history.
    pub tombstones: u64,
    /// Scopes, namespaces included.
    pub scopes: u64,
    /// Container namespaces.
    pub namespaces: u64,
    /// `(symbol, timestamp)` dependency pairs, counted once on the parent
    /// side, across both contexts.
    pub edges: u64,
}

// =============================================================================
// SYMBOL GRAPH
// =============================================================================

/// Arena of scopes, symbols, and identities, plus every operation that
/// rewires them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolGraph {
    scopes: BTreeMap<ScopeId, Scope>,
    symbols: BTreeMap<SymbolId, Symbol>,
    identities: BTreeMap<ObjectId, IdentityEntry>,
    global_scope: ScopeId,
    next_scope_id: u64,
    next_symbol_id: u64,
}

impl Default for SymbolGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGraph {
    /// Create a graph holding only the session global scope.
    #[must_use]
    pub fn new() -> Self {
        let global_scope = ScopeId(0);
        let mut scopes = BTreeMap::new();
        scopes.insert(
            global_scope,
            Scope::lexical(global_scope, None, ScopeKind::Module, "<session>"),
        );
        Self {
            scopes,
            symbols: BTreeMap::new(),
            identities: BTreeMap::new(),
            global_scope,
            next_scope_id: 1,
            next_symbol_id: 0,
        }
    }

    /// The session global scope.
    #[must_use]
    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    /// Look a scope up.
    pub fn scope(&self, id: ScopeId) -> Result<&Scope, FreshetError> {
        self.scopes.get(&id).ok_or(FreshetError::ScopeNotFound(id))
    }

    /// Look a symbol up.
    pub fn symbol(&self, id: SymbolId) -> Result<&Symbol, FreshetError> {
        self.symbols
            .get(&id)
            .ok_or(FreshetError::SymbolNotFound(id))
    }

    /// Look a symbol up mutably.
    pub fn symbol_mut(&mut self, id: SymbolId) -> Result<&mut Symbol, FreshetError> {
        self.symbols
            .get_mut(&id)
            .ok_or(FreshetError::SymbolNotFound(id))
    }

    /// Iterate all symbols in id order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Iterate all scopes in id order.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.values()
    }

    /// Size counters.
    #[must_use]
    pub fn counts(&self) -> GraphCounts {
        let tombstones = self.symbols.values().filter(|s| s.tombstone).count() as u64;
        let namespaces = self.scopes.values().filter(|s| s.is_namespace()).count() as u64;
        let edges = self
            .symbols
            .values()
            .map(|s| s.parents.len() as u64)
            .sum::<u64>();
        GraphCounts {
            symbols: self.symbols.len() as u64 - tombstones,
            tombstones,
            scopes: self.scopes.len() as u64,
            namespaces,
            edges,
        }
    }

    // =========================================================================
    // NAME RESOLUTION
    // =========================================================================

    /// Resolve a bare name from `from` outward along the scope chain.
    #[must_use]
    pub fn resolve_name(&self, from: ScopeId, name: &str) -> Option<SymbolId> {
        let key = SymbolName::Name(name.to_string());
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let scope = self.scopes.get(&id)?;
            if let Some(sym) = scope.local(&key) {
                return Some(sym);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Resolve a bare name from the global scope.
    #[must_use]
    pub fn lookup_global(&self, name: &str) -> Option<SymbolId> {
        self.resolve_name(self.global_scope, name)
    }

    /// Resolve an element of the namespace shadowing `owner`, if both the
    /// namespace and the element are known under the CURRENT generation.
    #[must_use]
    pub fn resolve_element(&self, owner: ObjectId, key: &SymbolName) -> Option<SymbolId> {
        let entry = self.identities.get(&owner)?;
        let ns = entry.namespace?;
        self.scopes.get(&ns)?.local(key)
    }

    // =========================================================================
    // IDENTITY SIDE TABLE
    // =========================================================================

    /// Ensure an identity entry exists and return a reference pinned to the
    /// current generation.
    pub fn track_identity(&mut self, obj: ObjectId) -> ObjectRef {
        let entry = self.identities.entry(obj).or_default();
        ObjectRef::new(obj, entry.generation)
    }

    /// The current-generation reference for `obj`, if tracked.
    #[must_use]
    pub fn current_ref(&self, obj: ObjectId) -> Option<ObjectRef> {
        self.identities
            .get(&obj)
            .map(|e| ObjectRef::new(obj, e.generation))
    }

    /// Whether `r` still refers to the identity's current generation.
    #[must_use]
    pub fn ref_is_current(&self, r: ObjectRef) -> bool {
        self.identities
            .get(&r.id)
            .is_some_and(|e| e.generation == r.generation)
    }

    /// Symbols currently holding the value `obj`.
    #[must_use]
    pub fn alias_symbols(&self, obj: ObjectId) -> BTreeSet<SymbolId> {
        self.identities
            .get(&obj)
            .map(|e| e.aliases.clone())
            .unwrap_or_default()
    }

    /// The host reports `obj` freed. The generation is bumped so stale
    /// references stop resolving; the old namespace and its element symbols
    /// are kept for history but unlinked from the identity.
    pub fn identity_discarded(&mut self, obj: ObjectId) {
        let entry = self.identities.entry(obj).or_default();
        entry.generation = entry.generation.saturating_add(1);
        entry.aliases.clear();
        entry.namespace = None;
    }

    // =========================================================================
    // SYMBOL CREATION & BINDING
    // =========================================================================

    /// Locate or create the symbol bound under `name` in `scope`.
    ///
    /// Creation does not record an update; the caller commits the write.
    pub fn ensure_symbol(
        &mut self,
        scope: ScopeId,
        name: SymbolName,
        flags: SymbolFlags,
    ) -> Result<SymbolId, FreshetError> {
        if let Some(existing) = self
            .scopes
            .get(&scope)
            .ok_or(FreshetError::ScopeNotFound(scope))?
            .local(&name)
        {
            return Ok(existing);
        }
        let id = SymbolId(self.next_symbol_id);
        self.next_symbol_id = self.next_symbol_id.saturating_add(1);

        let mut flags = flags;
        if scope == self.global_scope {
            flags.is_global = true;
        }
        let symbol = Symbol::new(id, name.clone(), scope, ObjectRef::default(), flags);
        self.symbols.insert(id, symbol);
        if let Some(s) = self.scopes.get_mut(&scope) {
            s.bind(name, id);
        }
        Ok(id)
    }

    /// Ensure the element namespace shadowing `obj` exists.
    ///
    /// The container kind is fixed at creation; a later operation with an
    /// incompatible kind is a resolution failure for the caller to degrade.
    pub fn ensure_namespace(
        &mut self,
        obj: ObjectId,
        kind: ContainerKind,
    ) -> Result<ScopeId, FreshetError> {
        let obj_ref = self.track_identity(obj);
        if let Some(ns) = self.identities.get(&obj).and_then(|e| e.namespace) {
            return Ok(ns);
        }
        let id = ScopeId(self.next_scope_id);
        self.next_scope_id = self.next_scope_id.saturating_add(1);
        self.scopes.insert(id, Scope::namespace(id, obj_ref, kind));
        if let Some(entry) = self.identities.get_mut(&obj) {
            entry.namespace = Some(id);
        }
        Ok(id)
    }

    /// Locate or create the element symbol for `key` in a namespace.
    pub fn ensure_element(
        &mut self,
        namespace: ScopeId,
        key: SymbolName,
    ) -> Result<SymbolId, FreshetError> {
        if !self
            .scopes
            .get(&namespace)
            .ok_or(FreshetError::ScopeNotFound(namespace))?
            .is_namespace()
        {
            return Err(FreshetError::ScopeNotFound(namespace));
        }
        self.ensure_symbol(namespace, key, SymbolFlags::default())
    }

    /// Record a write of `obj` into `sym` at `ts`, maintaining alias sets.
    ///
    /// Returns `false` only for an out-of-order timestamp — a second write
    /// in the same statement collapses into the existing entry.
    pub fn apply_write(
        &mut self,
        sym: SymbolId,
        ts: Timestamp,
        obj: ObjectRef,
    ) -> Result<bool, FreshetError> {
        let prev = self.symbol(sym)?.obj;

        let advanced = {
            let s = self
                .symbols
                .get_mut(&sym)
                .ok_or(FreshetError::SymbolNotFound(sym))?;
            if s.updated_ts() == ts {
                // Second write by the same statement: keep one history entry
                s.obj = obj;
                s.tombstone = false;
                true
            } else {
                s.record_update(ts, obj)
            }
        };
        if !advanced {
            return Ok(false);
        }

        if prev.id != obj.id {
            if let Some(entry) = self.identities.get_mut(&prev.id) {
                entry.aliases.remove(&sym);
            }
        }
        let entry = self.identities.entry(obj.id).or_default();
        if entry.generation == obj.generation {
            entry.aliases.insert(sym);
        }
        Ok(true)
    }

    /// Unbind a symbol from its scope and tombstone it. Historical edges
    /// remain resolvable.
    pub fn tombstone(&mut self, sym: SymbolId) -> Result<(), FreshetError> {
        let (scope, name, obj) = {
            let s = self.symbol(sym)?;
            (s.scope, s.name.clone(), s.obj)
        };
        if let Some(sc) = self.scopes.get_mut(&scope) {
            sc.unbind(&name);
        }
        if let Some(entry) = self.identities.get_mut(&obj.id) {
            entry.aliases.remove(&sym);
        }
        if let Some(s) = self.symbols.get_mut(&sym) {
            s.tombstone = true;
        }
        Ok(())
    }

    // =========================================================================
    // EDGES & USAGES
    // =========================================================================

    /// Record a dependency edge: `child`'s update at `ts` read `parent`.
    /// Both sides are written so the edge sets stay symmetric.
    pub fn record_edge(
        &mut self,
        ctx: DepContext,
        parent: SymbolId,
        child: SymbolId,
        ts: Timestamp,
    ) -> Result<(), FreshetError> {
        if !self.symbols.contains_key(&parent) {
            return Err(FreshetError::SymbolNotFound(parent));
        }
        if !self.symbols.contains_key(&child) {
            return Err(FreshetError::SymbolNotFound(child));
        }
        if let Some(p) = self.symbols.get_mut(&parent) {
            p.children.record(ctx, child, ts);
        }
        if let Some(c) = self.symbols.get_mut(&child) {
            c.parents.record(ctx, parent, ts);
        }
        Ok(())
    }

    /// Record that the statement at `used_at` read `sym`.
    pub fn record_usage(&mut self, sym: SymbolId, used_at: Timestamp) -> Result<(), FreshetError> {
        self.symbol_mut(sym)?.record_usage(used_at);
        Ok(())
    }

    // =========================================================================
    // CONTAINER OPERATIONS
    // =========================================================================

    /// Apply a structural container operation to the value `owner`.
    ///
    /// Writes the affected element symbols and every alias symbol of the
    /// container at `ts`, with `parents` as the statement's read set, under
    /// `ctx`. Returns the written symbols. A failure here is a resolution
    /// failure for the caller to degrade; the graph is left consistent.
    pub fn apply_op(
        &mut self,
        owner: ObjectId,
        op: &ContainerOp,
        ts: Timestamp,
        ctx: DepContext,
        parents: &[SymbolId],
    ) -> Result<Vec<SymbolId>, FreshetError> {
        let mut written = Vec::new();

        match op {
            ContainerOp::Append { obj } => {
                let ns = self.ensure_namespace(owner, ContainerKind::List)?;
                self.require_kind(ns, ContainerKind::List)?;
                let index = self.scope(ns)?.next_index();
                let child = self.ensure_element(ns, SymbolName::Index(index))?;
                self.write_element(child, *obj, ts, ctx, parents)?;
                written.push(child);
            }
            ContainerOp::Insert { index, obj } => {
                let ns = self.ensure_namespace(owner, ContainerKind::List)?;
                self.require_kind(ns, ContainerKind::List)?;
                let index = self.normalize_index(ns, *index, true)?;
                self.shift_up(ns, index)?;
                let child = self.ensure_element(ns, SymbolName::Index(index))?;
                self.write_element(child, *obj, ts, ctx, parents)?;
                written.push(child);
            }
            ContainerOp::RemoveAt { index } => {
                let ns = self.namespace_of(owner)?;
                self.require_kind(ns, ContainerKind::List)?;
                let index = self.normalize_index(ns, *index, false)?;
                let removed = self
                    .scope(ns)?
                    .local(&SymbolName::Index(index))
                    .ok_or_else(|| {
                        FreshetError::NameNotFound(SymbolName::Index(index).display())
                    })?;
                self.tombstone(removed)?;
                self.shift_down(ns, index)?;
                written.push(removed);
            }
            ContainerOp::RemoveValue { obj } => {
                let ns = self.namespace_of(owner)?;
                self.require_kind(ns, ContainerKind::List)?;
                let index = self
                    .scope(ns)?
                    .positional()
                    .into_iter()
                    .find(|(_, sym)| {
                        self.symbols.get(sym).is_some_and(|s| s.obj.id == *obj)
                    })
                    .map(|(i, _)| i)
                    .ok_or_else(|| FreshetError::NameNotFound(format!("value {}", obj.0)))?;
                return self.apply_op(owner, &ContainerOp::RemoveAt { index }, ts, ctx, parents);
            }
            ContainerOp::SetKey { key, obj } => {
                let ns = self.ensure_namespace(owner, ContainerKind::Map)?;
                self.require_kind(ns, ContainerKind::Map)?;
                let child = self.ensure_element(ns, SymbolName::Key(key.clone()))?;
                self.write_element(child, *obj, ts, ctx, parents)?;
                written.push(child);
            }
            ContainerOp::DelKey { key } => {
                let ns = self.namespace_of(owner)?;
                self.require_kind(ns, ContainerKind::Map)?;
                let removed = self
                    .scope(ns)?
                    .local(&SymbolName::Key(key.clone()))
                    .ok_or_else(|| FreshetError::NameNotFound(key.clone()))?;
                self.tombstone(removed)?;
                written.push(removed);
            }
            ContainerOp::Clear => {
                let ns = self.namespace_of(owner)?;
                let children: Vec<SymbolId> =
                    self.scope(ns)?.bindings.values().copied().collect();
                for child in children {
                    self.tombstone(child)?;
                    written.push(child);
                }
            }
            ContainerOp::ExtendFrom { source } => {
                let src_ns = self.namespace_of(*source)?;
                self.require_kind(src_ns, ContainerKind::List)?;
                let elements: Vec<ObjectId> = self
                    .scope(src_ns)?
                    .positional()
                    .into_iter()
                    .filter_map(|(_, sym)| self.symbols.get(&sym).map(|s| s.obj.id))
                    .collect();
                for obj in elements {
                    let mut sub =
                        self.apply_op(owner, &ContainerOp::Append { obj }, ts, ctx, parents)?;
                    written.append(&mut sub);
                }
            }
            ContainerOp::Overwrite => {
                // Wholesale invalidation: children may or may not have
                // changed, so each is re-timestamped in place and marked
                // unknown-deps. Identities are kept.
                if let Ok(ns) = self.namespace_of(owner) {
                    let children: Vec<SymbolId> =
                        self.scope(ns)?.bindings.values().copied().collect();
                    for child in children {
                        let obj = self.symbol(child)?.obj;
                        if self.apply_write(child, ts, obj)? {
                            self.symbol_mut(child)?.unknown_deps = true;
                            for p in parents {
                                self.record_edge(ctx, *p, child, ts)?;
                            }
                            written.push(child);
                        }
                    }
                }
            }
        }

        // The container itself changed: update every alias symbol
        let obj_ref = self.track_identity(owner);
        for alias in self.alias_symbols(owner) {
            if self.apply_write(alias, ts, obj_ref)? {
                for p in parents {
                    self.record_edge(ctx, *p, alias, ts)?;
                }
                written.push(alias);
            }
        }

        Ok(written)
    }

    /// Namespace elements of `obj` in key order. Empty when untracked.
    #[must_use]
    pub fn namespace_children(&self, obj: ObjectId) -> Vec<(SymbolName, SymbolId)> {
        self.identities
            .get(&obj)
            .and_then(|e| e.namespace)
            .and_then(|ns| self.scopes.get(&ns))
            .map(|scope| {
                scope
                    .bindings
                    .iter()
                    .map(|(name, sym)| (name.clone(), *sym))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The container kind of `obj`'s namespace, if one exists.
    #[must_use]
    pub fn container_kind_of(&self, obj: ObjectId) -> Option<ContainerKind> {
        self.identities
            .get(&obj)
            .and_then(|e| e.namespace)
            .and_then(|ns| self.scopes.get(&ns))
            .and_then(Scope::container_kind)
    }

    fn namespace_of(&self, obj: ObjectId) -> Result<ScopeId, FreshetError> {
        self.identities
            .get(&obj)
            .and_then(|e| e.namespace)
            .ok_or_else(|| FreshetError::NameNotFound(format!("namespace of object {}", obj.0)))
    }

    fn require_kind(&self, ns: ScopeId, kind: ContainerKind) -> Result<(), FreshetError> {
        if self.scope(ns)?.container_kind() == Some(kind) {
            Ok(())
        } else {
            Err(FreshetError::TracerState(format!(
                "container operation requires a {kind:?} namespace"
            )))
        }
    }

    fn write_element(
        &mut self,
        child: SymbolId,
        obj: ObjectId,
        ts: Timestamp,
        ctx: DepContext,
        parents: &[SymbolId],
    ) -> Result<(), FreshetError> {
        let obj_ref = self.track_identity(obj);
        if self.apply_write(child, ts, obj_ref)? {
            self.symbol_mut(child)?.unknown_deps = false;
            for p in parents {
                self.record_edge(ctx, *p, child, ts)?;
            }
        }
        Ok(())
    }

    /// Negative indices count from the end. `for_insert` admits the
    /// one-past-the-end position.
    fn normalize_index(
        &self,
        ns: ScopeId,
        index: i64,
        for_insert: bool,
    ) -> Result<i64, FreshetError> {
        let len = self.scope(ns)?.next_index();
        let resolved = if index < 0 {
            len.saturating_add(index)
        } else {
            index
        };
        let upper = if for_insert { len } else { len - 1 };
        if resolved < 0 || resolved > upper {
            return Err(FreshetError::NameNotFound(format!(
                "position {index} out of range for length {len}"
            )));
        }
        Ok(resolved)
    }

    /// Shift positional bindings at or above `from` up by one.
    ///
    /// Highest position first so rebinding never collides; element symbols
    /// keep their identity, only their bound name changes.
    fn shift_up(&mut self, ns: ScopeId, from: i64) -> Result<(), FreshetError> {
        let positions: Vec<(i64, SymbolId)> = self
            .scope(ns)?
            .positional()
            .into_iter()
            .filter(|(i, _)| *i >= from)
            .collect();
        for (i, sym) in positions.into_iter().rev() {
            self.rebind_position(ns, sym, i, i.saturating_add(1))?;
        }
        Ok(())
    }

    /// Shift positional bindings above `removed` down by one, lowest first.
    fn shift_down(&mut self, ns: ScopeId, removed: i64) -> Result<(), FreshetError> {
        let positions: Vec<(i64, SymbolId)> = self
            .scope(ns)?
            .positional()
            .into_iter()
            .filter(|(i, _)| *i > removed)
            .collect();
        for (i, sym) in positions {
            self.rebind_position(ns, sym, i, i - 1)?;
        }
        Ok(())
    }

    fn rebind_position(
        &mut self,
        ns: ScopeId,
        sym: SymbolId,
        from: i64,
        to: i64,
    ) -> Result<(), FreshetError> {
        let scope = self
            .scopes
            .get_mut(&ns)
            .ok_or(FreshetError::ScopeNotFound(ns))?;
        scope.unbind(&SymbolName::Index(from));
        scope.bind(SymbolName::Index(to), sym);
        self.symbol_mut(sym)?.name = SymbolName::Index(to);
        Ok(())
    }

    // =========================================================================
    // GARBAGE COLLECTION
    // =========================================================================

    /// Remove tombstoned symbols that nothing references any more: no
    /// symbol depends on them (no children in either context) and no
    /// execution record lists them (`protected`). Returns how many were
    /// collected.
    pub fn collect(&mut self, protected: &BTreeSet<SymbolId>) -> usize {
        let candidates: Vec<SymbolId> = self
            .symbols
            .values()
            .filter(|s| s.tombstone && s.children.is_empty() && !protected.contains(&s.id))
            .map(|s| s.id)
            .collect();

        for id in &candidates {
            let parent_ids: Vec<SymbolId> = self
                .symbols
                .get(id)
                .map(|s| {
                    DepContext::ALL
                        .iter()
                        .flat_map(|ctx| s.parents.in_context(*ctx).keys().copied())
                        .collect()
                })
                .unwrap_or_default();
            for p in parent_ids {
                if let Some(parent) = self.symbols.get_mut(&p) {
                    parent.children.forget(*id);
                }
            }
            if let Some(s) = self.symbols.remove(id) {
                if let Some(entry) = self.identities.get_mut(&s.obj.id) {
                    entry.aliases.remove(id);
                }
            }
        }
        candidates.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
