//! # Execution Tracer
//!
//! The only write path into the symbol graph during execution. The host
//! streams [`TraceEvent`]s through a narrow hook interface while it runs a
//! cell; the tracer accumulates them in pending per-statement state and
//! commits to the graph ONLY when the statement completes.
//!
//! ## Commit discipline
//!
//! A statement that raises must leave no trace. Every event between
//! [`Tracer::begin_statement`] and [`Tracer::finish_statement`] lands in
//! pending state; `finish_statement` performs the whole graph mutation for
//! the statement, `abort_statement` discards it. Reads are resolved eagerly
//! (the pre-statement value must be the one recorded), writes lazily.
//!
//! Commit order within a statement: usages, name writes, element writes,
//! deletes, container operations, then the static pass. Usages run first so
//! a self-referencing statement (`x = x + 1`) records the value timestamp
//! the read actually saw.
//!
//! ## Interrupts
//!
//! A first interrupt rolls back the in-flight statement. A second interrupt
//! in the same cell run, or an interrupt between statements, aborts the run;
//! statements already committed stay committed. An interrupt with nothing
//! in flight is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use crate::cell::StatementInfo;
use crate::context::ContextStack;
use crate::external::{CallEffect, CallResolver, ReceiverKind};
use crate::graph::{ContainerOp, SymbolGraph};
use crate::types::{
    ContainerKind, DepContext, FreshetError, ObjectId, ScopeId, SymbolFlags, SymbolId, SymbolName,
    Timestamp,
};

// =============================================================================
// ANOMALY LOGGING
// =============================================================================

/// Log a trace anomaly to stderr in a structured format.
///
/// The core stays free of logger dependencies; the app layer redirects
/// stderr into its tracing pipeline.
fn log_anomaly(context: &str, detail: &str) {
    eprintln!(
        "{{\"level\":\"warn\",\"target\":\"freshet_core::tracer\",\"message\":\"trace anomaly in {context}: {detail}\"}}"
    );
}

// =============================================================================
// EVENTS
// =============================================================================

/// A positional call argument as the host observed it.
///
/// Values the host tracks by identity arrive as `Obj`; raw literals that
/// were never interned arrive as `Int`/`Str` so precise effects that need
/// them (insert positions, map keys) still resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// A tracked value.
    Obj(ObjectId),
    /// An untracked integer literal.
    Int(i64),
    /// An untracked string literal.
    Str(String),
}

/// One observation from the host, streamed while a statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A bare name was read.
    LoadName {
        /// The name as written.
        name: String,
    },
    /// A bare name was bound or rebound.
    StoreName {
        /// The name as written.
        name: String,
        /// Identity of the stored value.
        obj: ObjectId,
        /// Classification of the binding.
        flags: SymbolFlags,
        /// Host type annotation, if known.
        type_note: Option<String>,
        /// Module path for import bindings.
        import_origin: Option<String>,
    },
    /// A container element or attribute was read.
    LoadElement {
        /// Identity of the container.
        owner: ObjectId,
        /// Element key.
        key: SymbolName,
    },
    /// A container element or attribute was written.
    StoreElement {
        /// Identity of the container.
        owner: ObjectId,
        /// Element key.
        key: SymbolName,
        /// Identity of the stored value.
        obj: ObjectId,
    },
    /// A bare name was deleted.
    DeleteName {
        /// The name as written.
        name: String,
    },
    /// A container element or attribute was deleted.
    DeleteElement {
        /// Identity of the container.
        owner: ObjectId,
        /// Element key.
        key: SymbolName,
    },
    /// Control entered a call the tracer may not see inside.
    CallEnter {
        /// Callee name as written.
        callee: String,
        /// Identity of the receiver for method calls.
        receiver: Option<ObjectId>,
        /// Positional arguments.
        args: Vec<CallArg>,
    },
    /// The innermost pending call returned.
    CallReturn {
        /// Identity of the returned value, `None` for a null return.
        value: Option<ObjectId>,
    },
    /// The host directly reports a structural container mutation.
    Mutate {
        /// Identity of the container.
        owner: ObjectId,
        /// The operation performed.
        op: ContainerOp,
    },
}

/// The tracer's answer to a hook call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Keep streaming events.
    Continue,
    /// The tracer needs no events from inside this call; the host may skip
    /// tracing until the matching return.
    Opaque,
}

/// Outcome of an interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The in-flight statement was discarded; the cell run continues.
    RolledBackStatement,
    /// The cell run was abandoned; committed statements stay committed.
    AbortedCell,
    /// Nothing was in flight.
    Idle,
}

// =============================================================================
// COMMIT RESULTS
// =============================================================================

/// What one committed statement did to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementCommit {
    /// The statement's timestamp.
    pub ts: Timestamp,
    /// Symbols the statement read.
    pub read: BTreeSet<SymbolId>,
    /// Symbols the statement wrote, container aliases included.
    pub wrote: BTreeSet<SymbolId>,
}

/// Per-timestamp read/write record of a finished cell run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCommit {
    /// The run's execution counter.
    pub counter: u64,
    /// Symbols read, keyed by statement timestamp.
    pub used: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
    /// Symbols written, keyed by statement timestamp.
    pub updated: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
}

// =============================================================================
// PENDING STATE
// =============================================================================

#[derive(Debug, Clone)]
struct PendingNameWrite {
    obj: ObjectId,
    flags: SymbolFlags,
    type_note: Option<String>,
    import_origin: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingCall {
    callee: String,
    receiver: Option<ObjectId>,
    args: Vec<CallArg>,
}

/// Everything a statement has observed but not yet committed.
#[derive(Debug, Clone, Default)]
struct PendingStatement {
    index: i64,
    info: StatementInfo,
    reads: BTreeSet<SymbolId>,
    unresolved_reads: Vec<String>,
    name_writes: BTreeMap<String, PendingNameWrite>,
    element_writes: BTreeMap<(ObjectId, SymbolName), ObjectId>,
    name_deletes: BTreeSet<String>,
    element_deletes: Vec<(ObjectId, SymbolName)>,
    ops: Vec<(ObjectId, ContainerOp)>,
    calls: Vec<PendingCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    InCell,
    InStatement,
}

// =============================================================================
// TRACER
// =============================================================================

/// Streams host events into per-statement pending state and commits them to
/// the graph at statement boundaries.
#[derive(Debug)]
pub struct Tracer {
    resolver: CallResolver,
    contexts: ContextStack,
    phase: Phase,
    exec_counter: u64,
    next_stmt: i64,
    rolled_back: bool,
    pending: Option<PendingStatement>,
    scope_stack: Vec<ScopeId>,
    cell_used: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
    cell_updated: BTreeMap<Timestamp, BTreeSet<SymbolId>>,
}

impl Tracer {
    /// Create a tracer using `resolver` for opaque calls.
    #[must_use]
    pub fn new(resolver: CallResolver) -> Self {
        Self {
            resolver,
            contexts: ContextStack::new(),
            phase: Phase::Idle,
            exec_counter: 0,
            next_stmt: 0,
            rolled_back: false,
            pending: None,
            scope_stack: Vec::new(),
            cell_used: BTreeMap::new(),
            cell_updated: BTreeMap::new(),
        }
    }

    /// The external-call resolver, for host registrations.
    pub fn resolver_mut(&mut self) -> &mut CallResolver {
        &mut self.resolver
    }

    /// Read access to the resolver.
    #[must_use]
    pub fn resolver(&self) -> &CallResolver {
        &self.resolver
    }

    /// Whether no cell run is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start tracing a cell run under `counter`.
    pub fn begin_cell(&mut self, counter: u64) -> Result<(), FreshetError> {
        if self.phase != Phase::Idle {
            return Err(FreshetError::TracerState(
                "begin_cell during an active run".to_string(),
            ));
        }
        self.phase = Phase::InCell;
        self.exec_counter = counter;
        self.next_stmt = 0;
        self.rolled_back = false;
        self.cell_used.clear();
        self.cell_updated.clear();
        Ok(())
    }

    /// Start tracing the next statement of the current run.
    ///
    /// Returns the timestamp the statement will commit under. Statement
    /// indices advance monotonically; a rolled-back statement's timestamp is
    /// never reused.
    pub fn begin_statement(&mut self, info: &StatementInfo) -> Result<Timestamp, FreshetError> {
        if self.phase != Phase::InCell {
            return Err(FreshetError::TracerState(
                "begin_statement outside a cell run".to_string(),
            ));
        }
        let index = self.next_stmt;
        self.next_stmt = self.next_stmt.saturating_add(1);
        self.phase = Phase::InStatement;
        self.pending = Some(PendingStatement {
            index,
            info: info.clone(),
            ..PendingStatement::default()
        });
        Ok(Timestamp::new(self.exec_counter as i64, index))
    }

    /// Discard the in-flight statement without touching the graph.
    pub fn abort_statement(&mut self) -> Result<(), FreshetError> {
        if self.phase != Phase::InStatement {
            return Err(FreshetError::TracerState(
                "abort_statement with no statement in flight".to_string(),
            ));
        }
        self.pending = None;
        self.phase = Phase::InCell;
        Ok(())
    }

    /// Interrupt the run, escalating on repetition.
    pub fn interrupt(&mut self) -> InterruptOutcome {
        match self.phase {
            Phase::InStatement => {
                self.pending = None;
                if self.rolled_back {
                    self.reset_run();
                    InterruptOutcome::AbortedCell
                } else {
                    self.rolled_back = true;
                    self.phase = Phase::InCell;
                    InterruptOutcome::RolledBackStatement
                }
            }
            Phase::InCell => {
                self.reset_run();
                InterruptOutcome::AbortedCell
            }
            Phase::Idle => InterruptOutcome::Idle,
        }
    }

    /// Finish the cell run and hand back its read/write record.
    pub fn finish_cell(&mut self) -> Result<CellCommit, FreshetError> {
        if self.phase != Phase::InCell {
            return Err(FreshetError::TracerState(
                "finish_cell outside a cell run".to_string(),
            ));
        }
        self.phase = Phase::Idle;
        Ok(CellCommit {
            counter: self.exec_counter,
            used: std::mem::take(&mut self.cell_used),
            updated: std::mem::take(&mut self.cell_updated),
        })
    }

    fn reset_run(&mut self) {
        self.phase = Phase::Idle;
        self.pending = None;
        self.cell_used.clear();
        self.cell_updated.clear();
    }

    // =========================================================================
    // SCOPES
    // =========================================================================

    /// Enter a lexical scope (function or class body).
    pub fn push_scope(&mut self, scope: ScopeId) {
        self.scope_stack.push(scope);
    }

    /// Leave the innermost lexical scope.
    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        self.scope_stack.pop()
    }

    fn current_scope(&self, graph: &SymbolGraph) -> ScopeId {
        self.scope_stack
            .last()
            .copied()
            .unwrap_or_else(|| graph.global_scope())
    }

    // =========================================================================
    // EVENT INTAKE
    // =========================================================================

    /// Observe one event of the in-flight statement.
    pub fn observe(
        &mut self,
        graph: &mut SymbolGraph,
        event: TraceEvent,
    ) -> Result<EventOutcome, FreshetError> {
        if self.phase != Phase::InStatement {
            return Err(FreshetError::TracerState(
                "event with no statement in flight".to_string(),
            ));
        }
        let scope = self.current_scope(graph);
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| FreshetError::TracerState("pending state missing".to_string()))?;

        match event {
            TraceEvent::LoadName { name } => match graph.resolve_name(scope, &name) {
                Some(sym) => {
                    pending.reads.insert(sym);
                }
                None => pending.unresolved_reads.push(name),
            },
            TraceEvent::StoreName {
                name,
                obj,
                flags,
                type_note,
                import_origin,
            } => {
                pending.name_writes.insert(
                    name,
                    PendingNameWrite {
                        obj,
                        flags,
                        type_note,
                        import_origin,
                    },
                );
            }
            TraceEvent::LoadElement { owner, key } => {
                if let Some(sym) = graph.resolve_element(owner, &key) {
                    pending.reads.insert(sym);
                } else {
                    // No element symbol to attach to: fall back to the
                    // container bindings so the read is coarse, not lost
                    let aliases = graph.alias_symbols(owner);
                    if aliases.is_empty() {
                        pending.unresolved_reads.push(key.display());
                    } else {
                        pending.reads.extend(aliases);
                    }
                }
            }
            TraceEvent::StoreElement { owner, key, obj } => {
                pending.element_writes.insert((owner, key), obj);
            }
            TraceEvent::DeleteName { name } => {
                pending.name_deletes.insert(name);
            }
            TraceEvent::DeleteElement { owner, key } => match key {
                SymbolName::Index(index) => {
                    pending.ops.push((owner, ContainerOp::RemoveAt { index }));
                }
                SymbolName::Key(key) => {
                    pending.ops.push((owner, ContainerOp::DelKey { key }));
                }
                SymbolName::Name(_) => pending.element_deletes.push((owner, key)),
            },
            TraceEvent::CallEnter {
                callee,
                receiver,
                args,
            } => {
                let kind = receiver_kind(graph, receiver);
                let opaque = self.resolver.knows(kind, &callee);
                pending.calls.push(PendingCall {
                    callee,
                    receiver,
                    args,
                });
                return Ok(if opaque {
                    EventOutcome::Opaque
                } else {
                    EventOutcome::Continue
                });
            }
            TraceEvent::CallReturn { value } => match pending.calls.pop() {
                Some(call) => {
                    let kind = receiver_kind(graph, call.receiver);
                    let effect = self.resolver.resolve(kind, &call.callee, value.is_none());
                    queue_effect(pending, &call, effect);
                }
                None => log_anomaly("call_return", "return with no pending call"),
            },
            TraceEvent::Mutate { owner, op } => {
                pending.ops.push((owner, op));
            }
        }
        Ok(EventOutcome::Continue)
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Commit the in-flight statement to the graph.
    pub fn finish_statement(
        &mut self,
        graph: &mut SymbolGraph,
    ) -> Result<StatementCommit, FreshetError> {
        if self.phase != Phase::InStatement {
            return Err(FreshetError::TracerState(
                "finish_statement with no statement in flight".to_string(),
            ));
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| FreshetError::TracerState("pending state missing".to_string()))?;
        self.phase = Phase::InCell;

        let ts = Timestamp::new(self.exec_counter as i64, pending.index);
        let scope = self.current_scope(graph);
        let ctx = self.contexts.active();
        let tainted = !pending.unresolved_reads.is_empty();
        if tainted {
            log_anomaly(
                "resolve",
                &format!("unresolved reads: {}", pending.unresolved_reads.join(", ")),
            );
        }
        if !pending.calls.is_empty() {
            log_anomaly("commit", "calls still pending at statement end");
        }

        // Usages first: writes below must not disturb pre-statement values
        for sym in &pending.reads {
            graph.record_usage(*sym, ts)?;
        }
        let parents: Vec<SymbolId> = pending.reads.iter().copied().collect();
        let mut wrote = BTreeSet::new();

        for (name, w) in &pending.name_writes {
            let sym = graph.ensure_symbol(scope, SymbolName::name(name.clone()), w.flags)?;
            let obj_ref = graph.track_identity(w.obj);
            if graph.apply_write(sym, ts, obj_ref)? {
                let symbol = graph.symbol_mut(sym)?;
                let was_global = symbol.flags.is_global;
                symbol.flags = w.flags;
                symbol.flags.is_global = was_global || w.flags.is_global;
                symbol.type_note.clone_from(&w.type_note);
                if w.import_origin.is_some() {
                    symbol.import_origin.clone_from(&w.import_origin);
                }
                symbol.unknown_deps = tainted;
                for parent in &parents {
                    graph.record_edge(ctx, *parent, sym, ts)?;
                }
                wrote.insert(sym);
            } else {
                log_anomaly("commit", &format!("out-of-order write of {name} dropped"));
            }
        }

        for ((owner, key), obj) in &pending.element_writes {
            let kind = match key {
                SymbolName::Index(_) => ContainerKind::List,
                SymbolName::Key(_) => ContainerKind::Map,
                SymbolName::Name(_) => ContainerKind::Object,
            };
            let ns = graph.ensure_namespace(*owner, kind)?;
            let sym = graph.ensure_element(ns, key.clone())?;
            let obj_ref = graph.track_identity(*obj);
            if graph.apply_write(sym, ts, obj_ref)? {
                graph.symbol_mut(sym)?.unknown_deps = tainted;
                for parent in &parents {
                    graph.record_edge(ctx, *parent, sym, ts)?;
                }
                wrote.insert(sym);
                // A subscript store mutates the container too
                touch_aliases(graph, *owner, ts, ctx, &parents, &mut wrote)?;
            }
        }

        for name in &pending.name_deletes {
            match graph.resolve_name(scope, name) {
                Some(sym) => graph.tombstone(sym)?,
                None => log_anomaly("commit", &format!("delete of unbound name {name}")),
            }
        }
        for (owner, key) in &pending.element_deletes {
            match graph.resolve_element(*owner, key) {
                Some(sym) => {
                    graph.tombstone(sym)?;
                    touch_aliases(graph, *owner, ts, ctx, &parents, &mut wrote)?;
                }
                None => log_anomaly(
                    "commit",
                    &format!("delete of unresolved element {}", key.display()),
                ),
            }
        }

        for (owner, op) in &pending.ops {
            match graph.apply_op(*owner, op, ts, ctx, &parents) {
                Ok(written) => wrote.extend(written),
                Err(e) => log_anomaly("external", &format!("{op:?} on object {}: {e}", owner.0)),
            }
        }

        // Static pass: name-level edges from the statement's syntax, usable
        // for cells that have not run yet and as a fallback slice context
        self.contexts.push(DepContext::Static);
        let static_ctx = self.contexts.active();
        let static_reads: Vec<SymbolId> = pending
            .info
            .reads
            .iter()
            .filter_map(|n| graph.resolve_name(scope, n))
            .collect();
        let static_writes: Vec<SymbolId> = pending
            .info
            .writes
            .iter()
            .filter_map(|n| graph.resolve_name(scope, n))
            .collect();
        for w in &static_writes {
            for r in &static_reads {
                graph.record_edge(static_ctx, *r, *w, ts)?;
            }
        }
        self.contexts.pop();

        if !pending.reads.is_empty() {
            self.cell_used.insert(ts, pending.reads.clone());
        }
        if !wrote.is_empty() {
            self.cell_updated.insert(ts, wrote.clone());
        }
        Ok(StatementCommit {
            ts,
            read: pending.reads,
            wrote,
        })
    }
}

// =============================================================================
// EFFECT TRANSLATION
// =============================================================================

fn receiver_kind(graph: &SymbolGraph, receiver: Option<ObjectId>) -> ReceiverKind {
    let Some(obj) = receiver else {
        return ReceiverKind::None;
    };
    match graph.container_kind_of(obj) {
        Some(ContainerKind::List) => ReceiverKind::List,
        Some(ContainerKind::Map) => ReceiverKind::Map,
        Some(ContainerKind::Object) => ReceiverKind::Object,
        None => {
            let is_module = graph
                .alias_symbols(obj)
                .iter()
                .any(|s| graph.symbol(*s).is_ok_and(|sym| sym.flags.is_module));
            if is_module {
                ReceiverKind::Module
            } else {
                ReceiverKind::Object
            }
        }
    }
}

/// A precise effect whose arguments turn out untraceable degrades to a
/// standard mutation of the receiver rather than being dropped.
fn degrade(pending: &mut PendingStatement, call: &PendingCall, context: &str) {
    if let Some(r) = call.receiver {
        pending.ops.push((r, ContainerOp::Overwrite));
    }
    log_anomaly(
        context,
        &format!("arguments of {} not traceable, degrading", call.callee),
    );
}

/// Translate a resolved effect into pending container operations.
fn queue_effect(pending: &mut PendingStatement, call: &PendingCall, effect: CallEffect) {
    let receiver = call.receiver;
    match effect {
        CallEffect::NoEffect => {}
        CallEffect::StandardMutation => match receiver {
            Some(r) => pending.ops.push((r, ContainerOp::Overwrite)),
            None => log_anomaly("effect", &format!("{} mutates a missing receiver", call.callee)),
        },
        CallEffect::MutateArgument { index } => match call.args.get(index) {
            Some(CallArg::Obj(obj)) => pending.ops.push((*obj, ContainerOp::Overwrite)),
            _ => log_anomaly(
                "effect",
                &format!("argument {index} of {} is not a tracked object", call.callee),
            ),
        },
        CallEffect::ListAppend => match (receiver, call.args.first()) {
            (Some(r), Some(CallArg::Obj(obj))) => {
                pending.ops.push((r, ContainerOp::Append { obj: *obj }));
            }
            _ => degrade(pending, call, "list_append"),
        },
        CallEffect::ListInsert => match (receiver, call.args.first(), call.args.get(1)) {
            (Some(r), Some(CallArg::Int(index)), Some(CallArg::Obj(obj))) => {
                pending.ops.push((
                    r,
                    ContainerOp::Insert {
                        index: *index,
                        obj: *obj,
                    },
                ));
            }
            _ => degrade(pending, call, "list_insert"),
        },
        CallEffect::ListExtend => match (receiver, call.args.first()) {
            (Some(r), Some(CallArg::Obj(source))) => {
                pending
                    .ops
                    .push((r, ContainerOp::ExtendFrom { source: *source }));
            }
            _ => degrade(pending, call, "list_extend"),
        },
        CallEffect::ListRemoveValue => match (receiver, call.args.first()) {
            (Some(r), Some(CallArg::Obj(obj))) => {
                pending.ops.push((r, ContainerOp::RemoveValue { obj: *obj }));
            }
            _ => degrade(pending, call, "list_remove"),
        },
        CallEffect::ListPop => match (receiver, call.args.first()) {
            (Some(r), None) => pending.ops.push((r, ContainerOp::RemoveAt { index: -1 })),
            (Some(r), Some(CallArg::Int(index))) => {
                pending.ops.push((r, ContainerOp::RemoveAt { index: *index }));
            }
            _ => degrade(pending, call, "list_pop"),
        },
        CallEffect::ContainerClear => match receiver {
            Some(r) => pending.ops.push((r, ContainerOp::Clear)),
            None => log_anomaly("effect", "clear on a missing receiver"),
        },
        CallEffect::MapRemoveKey => match (receiver, call.args.first()) {
            (Some(r), Some(CallArg::Str(key))) => {
                pending.ops.push((r, ContainerOp::DelKey { key: key.clone() }));
            }
            _ => degrade(pending, call, "map_pop"),
        },
    }
}

/// Advance every binding of a mutated container to `ts`.
fn touch_aliases(
    graph: &mut SymbolGraph,
    owner: ObjectId,
    ts: Timestamp,
    ctx: DepContext,
    parents: &[SymbolId],
    wrote: &mut BTreeSet<SymbolId>,
) -> Result<(), FreshetError> {
    let obj_ref = graph.track_identity(owner);
    for alias in graph.alias_symbols(owner) {
        if graph.apply_write(alias, ts, obj_ref)? {
            for parent in parents {
                graph.record_edge(ctx, *parent, alias, ts)?;
            }
            wrote.insert(alias);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
