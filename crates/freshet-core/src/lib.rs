//! # freshet-core
//!
//! The deterministic dataflow engine for Freshet - THE LOGIC.
//!
//! This crate tracks what a notebook session's values depend on. A host
//! runtime feeds it trace events (name loads, stores, calls, container
//! mutations) and cell registrations; the engine maintains the symbol
//! graph, classifies every symbol and cell as fresh or stale, and answers
//! slicing queries over the execution history.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the ONLY place where dataflow state exists; hosts hold a [`Session`]
//! - Is host-agnostic: it never inspects values, only identities and names
//! - Is deterministic: ordered collections throughout, no randomness
//! - Never executes code; it only observes executions the host performs
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod cell;
pub mod context;
pub mod export;
pub mod external;
pub mod graph;
pub mod primitives;
pub mod propagate;
pub mod scope;
pub mod session;
pub mod slice;
pub mod symbol;
pub mod tracer;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CellId, ContainerKind, DepContext, FreshetError, ObjectId, ObjectRef, ScopeId, SymbolFlags,
    SymbolId, SymbolName, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use cell::{Cell, Execution, StatementInfo};
pub use context::ContextStack;
pub use external::{CallEffect, CallResolver, ReceiverKind, ReturnOverride};
pub use graph::{ContainerOp, GraphCounts, IdentityEntry, SymbolGraph};
pub use scope::{Scope, ScopeKind};
pub use symbol::{EdgeSet, Symbol, SymbolStatus, UsageRecord};

// =============================================================================
// RE-EXPORTS: Tracing & Sessions
// =============================================================================

pub use session::{RunOutcome, Session, SessionConfig, SessionStats, SymbolReport};
pub use tracer::{
    CallArg, CellCommit, EventOutcome, InterruptOutcome, StatementCommit, TraceEvent, Tracer,
};

// =============================================================================
// RE-EXPORTS: Analysis
// =============================================================================

pub use propagate::{
    CellReport, CellStatus, ExecutionSchedule, FlowOrder, PropagationSummary, cell_reports,
    propagate_updates,
};
pub use slice::{ContextPolicy, Slice, SliceLine, Slicer};

// =============================================================================
// RE-EXPORTS: Snapshots (from export module)
// =============================================================================

pub use export::{
    SnapshotBody, SnapshotHeader, export_snapshot, import_snapshot, snapshot_checksum,
    verify_snapshot,
};
