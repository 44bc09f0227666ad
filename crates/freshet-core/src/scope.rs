//! # Scopes and Namespaces
//!
//! A [`Scope`] is a container of symbol bindings. Lexical scopes
//! (module/function/class) form a tree rooted at the session global scope
//! and resolve bare names by walking outward. Namespace scopes are keyed by
//! runtime object identity and hold a container's element symbols; they are
//! backed by whichever alias symbols currently hold the container value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ContainerKind, ObjectRef, ScopeId, SymbolId, SymbolName};

/// What a scope contains and how its names behave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// The session global scope or an imported module's top level.
    Module,
    /// A function body.
    Function,
    /// A class body.
    Class,
    /// Element symbols of a runtime container value.
    Namespace {
        /// The container value this namespace shadows.
        object: ObjectRef,
        /// Shape of the container (decides valid keys and re-indexing).
        container: ContainerKind,
    },
}

/// A container of symbol bindings.
///
/// Invariant: every symbol bound here has its scope field pointing back at
/// this scope; the graph maintains both sides on bind/unbind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// The scope's identifier.
    pub id: ScopeId,
    /// Enclosing scope, `None` only for the session global scope.
    pub parent: Option<ScopeId>,
    /// What this scope contains.
    pub kind: ScopeKind,
    /// Display label (module path, function/class name, or container repr).
    pub label: String,
    /// Bindings held by this scope.
    pub bindings: BTreeMap<SymbolName, SymbolId>,
}

impl Scope {
    /// Create a lexical scope.
    #[must_use]
    pub fn lexical(id: ScopeId, parent: Option<ScopeId>, kind: ScopeKind, label: &str) -> Self {
        Self {
            id,
            parent,
            kind,
            label: label.to_string(),
            bindings: BTreeMap::new(),
        }
    }

    /// Create a namespace scope for a container value.
    #[must_use]
    pub fn namespace(id: ScopeId, object: ObjectRef, container: ContainerKind) -> Self {
        Self {
            id,
            parent: None,
            kind: ScopeKind::Namespace { object, container },
            label: format!("<namespace {}>", object.id.0),
            bindings: BTreeMap::new(),
        }
    }

    /// Whether this scope holds container elements.
    #[must_use]
    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, ScopeKind::Namespace { .. })
    }

    /// The container shape, for namespace scopes.
    #[must_use]
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match self.kind {
            ScopeKind::Namespace { container, .. } => Some(container),
            _ => None,
        }
    }

    /// The container value identity, for namespace scopes.
    #[must_use]
    pub fn namespace_object(&self) -> Option<ObjectRef> {
        match self.kind {
            ScopeKind::Namespace { object, .. } => Some(object),
            _ => None,
        }
    }

    /// Look a name up in this scope only (no chain walk).
    #[must_use]
    pub fn local(&self, name: &SymbolName) -> Option<SymbolId> {
        self.bindings.get(name).copied()
    }

    /// Bind a name, returning the displaced symbol if the name was taken.
    pub fn bind(&mut self, name: SymbolName, symbol: SymbolId) -> Option<SymbolId> {
        self.bindings.insert(name, symbol)
    }

    /// Remove a binding, returning the symbol that held it.
    pub fn unbind(&mut self, name: &SymbolName) -> Option<SymbolId> {
        self.bindings.remove(name)
    }

    /// Positional bindings in index order (for `List` namespaces).
    #[must_use]
    pub fn positional(&self) -> Vec<(i64, SymbolId)> {
        self.bindings
            .iter()
            .filter_map(|(name, sym)| match name {
                SymbolName::Index(i) => Some((*i, *sym)),
                _ => None,
            })
            .collect()
    }

    /// The index one past the last positional binding.
    #[must_use]
    pub fn next_index(&self) -> i64 {
        self.positional()
            .last()
            .map_or(0, |(i, _)| i.saturating_add(1))
    }
}

// =============================================================================
// TESTS
// =============================================================================
