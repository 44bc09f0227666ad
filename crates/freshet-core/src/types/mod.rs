//! # Core Type Definitions
//!
//! This module contains the foundation types for the Freshet dataflow engine:
//! - Graph identifiers (`SymbolId`, `ScopeId`, `CellId`, `ObjectId`, `ObjectRef`)
//! - The logical clock (`Timestamp`)
//! - Symbol naming and classification (`SymbolName`, `SymbolFlags`, `ContainerKind`)
//! - Dependency context tagging (`DepContext`)
//! - Error types (`FreshetError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for counters to prevent overflow

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Unique identifier for a tracked symbol.
///
/// A symbol is a stable handle distinct from the runtime value it currently
/// holds; the handle persists across reassignment within the same binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

/// Unique identifier for a scope (lexical or namespace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u64);

/// Unique identifier for a registered cell.
///
/// Cell identity is stable across edits and re-runs; the execution counter
/// (carried by [`Timestamp::cell`]) changes on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(pub u64);

/// Opaque runtime identity of a host value.
///
/// Supplied by the host (e.g. an address or handle). The engine never
/// dereferences it; it only keys the identity side table with it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectId(pub u64);

/// A runtime identity pinned to the generation under which it was observed.
///
/// Hosts recycle identities (a freed value's address may be reused). The
/// identity side table bumps a generation counter when the host reports an
/// identity discarded, so a stale `ObjectRef` stops resolving instead of
/// silently attaching edges to an unrelated value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectRef {
    /// The host-supplied identity.
    pub id: ObjectId,
    /// Generation of the identity table entry when this reference was taken.
    pub generation: u64,
}

impl ObjectRef {
    /// Create a reference to an identity at a given generation.
    #[must_use]
    pub const fn new(id: ObjectId, generation: u64) -> Self {
        Self { id, generation }
    }
}

// =============================================================================
// TIMESTAMP (logical clock)
// =============================================================================

/// Logical clock value totally ordering every statement ever executed.
///
/// `cell` is the session-wide execution counter of the run and `stmt` the
/// statement index within that run. The derived `Ord` is lexicographic over
/// `(cell, stmt)`, which is exactly the execution order. Timestamps are
/// immutable values and are never reused.
///
/// Comparing a `Timestamp` against anything that is not a `Timestamp` does
/// not compile; ordering misuse is unrepresentable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Execution counter of the run this statement belonged to.
    pub cell: i64,
    /// Statement index within the run.
    pub stmt: i64,
}

impl Timestamp {
    /// Sentinel preceding all real timestamps.
    pub const UNINITIALIZED: Self = Self { cell: -1, stmt: -1 };

    /// Create a timestamp for statement `stmt` of execution `cell`.
    #[must_use]
    pub const fn new(cell: i64, stmt: i64) -> Self {
        Self { cell, stmt }
    }

    /// Whether this timestamp refers to a real statement execution.
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        self.cell >= 0 && self.stmt >= 0
    }
}

// =============================================================================
// SYMBOL NAMING & CLASSIFICATION
// =============================================================================

/// The name a symbol is bound under within its scope.
///
/// Bare names and attributes use `Name`; positional container elements use
/// `Index` (subject to re-indexing on insert/remove); keyed container
/// elements use `Key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolName {
    /// A bare name or attribute name.
    Name(String),
    /// A positional element of a sequence container.
    Index(i64),
    /// A keyed element of a mapping container.
    Key(String),
}

impl SymbolName {
    /// Create a bare/attribute name.
    #[must_use]
    pub fn name(s: impl Into<String>) -> Self {
        Self::Name(s.into())
    }

    /// Render the name the way a front-end would display it.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Name(s) => s.clone(),
            Self::Index(i) => format!("[{i}]"),
            Self::Key(k) => format!("[\"{k}\"]"),
        }
    }

    /// The bare name, if this is a `Name` binding.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(s) => Some(s),
            _ => None,
        }
    }
}

/// Classification flags carried by a symbol.
///
/// Flags are observations forwarded by the host at store time, not
/// inferences made by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SymbolFlags {
    /// Bound to a function value.
    pub is_function: bool,
    /// Bound to a class value.
    pub is_class: bool,
    /// Bound to a module value.
    pub is_module: bool,
    /// Created by an import statement.
    pub is_import: bool,
    /// Has no user-visible name (intermediate/anonymous binding).
    pub is_anonymous: bool,
    /// Reachable by name from the session global scope.
    pub is_global: bool,
}

/// The shape of a container namespace.
///
/// Decides which element keys are valid and whether positional re-indexing
/// applies on insert/remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Positional container (`Index` keys, re-indexed on insert/remove).
    List,
    /// Keyed container (`Key` keys).
    Map,
    /// Attribute holder (`Name` keys): instances and modules.
    Object,
}

// =============================================================================
// DEPENDENCY CONTEXT
// =============================================================================

/// The provenance of a dependency edge.
///
/// Dynamic edges come from observing the executing program; static edges
/// come from syntactic name-reachability. The two contexts are parallel edge
/// sets on the same symbols, and propagation/slicing choose which to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DepContext {
    /// Edge observed during actual execution.
    Dynamic,
    /// Edge derived from syntactic reachability without execution.
    Static,
}

impl DepContext {
    /// Both contexts, in the order edge families are written.
    pub const ALL: [Self; 2] = [Self::Dynamic, Self::Static];

    /// Stable index for per-context storage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Dynamic => 0,
            Self::Static => 1,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Freshet engine.
///
/// - No silent failures
/// - Use `Result<T, FreshetError>` for fallible operations
/// - The CORE never panics; all errors are recoverable
///
/// Resolution failures during tracing are NOT errors: they degrade the
/// affected edges to an unknown-dependency marker and execution continues.
#[derive(Debug, Error)]
pub enum FreshetError {
    /// The requested symbol was not found in the graph.
    #[error("Symbol not found: {0:?}")]
    SymbolNotFound(SymbolId),

    /// No symbol is bound under the requested name.
    #[error("Name not bound: {0}")]
    NameNotFound(String),

    /// The requested cell was not registered with the session.
    #[error("Cell not found: {0:?}")]
    CellNotFound(CellId),

    /// The requested scope does not exist.
    #[error("Scope not found: {0:?}")]
    ScopeNotFound(ScopeId),

    /// No statement was executed at the requested timestamp.
    #[error("Timestamp not found: ({0}, {1})")]
    TimestampNotFound(i64, i64),

    /// A tracer hook was called out of sequence.
    #[error("Tracer state error: {0}")]
    TracerState(String),

    /// A registration or query exceeded a compiled-in limit.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
