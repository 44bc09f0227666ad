//! # External Call Resolution
//!
//! Calls into code the tracer cannot see (library functions, methods on
//! host values) still have dataflow consequences. The resolver decides what
//! an opaque call did to its receiver and arguments from three strategy
//! tables consulted in order:
//!
//! 1. an exact `(receiver kind, callee)` entry,
//! 2. a receiver-kind default entry,
//! 3. the null-return heuristic: a call on a mutation-eligible receiver
//!    that returned nothing is assumed to be a standard mutation of the
//!    receiver; everything else is assumed effect-free.
//!
//! A separate override table corrects callees whose return value would
//! mislead the heuristic (`pop` returns the removed element but mutates;
//! `get` returns a value and never mutates).
//!
//! Hosts extend every table at runtime; the seeded entries cover the
//! structural container methods the graph can model precisely.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RECEIVER CLASSIFICATION
// =============================================================================

/// What kind of value a call's receiver is, as far as the graph knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReceiverKind {
    /// Positional container.
    List,
    /// Keyed container.
    Map,
    /// Attribute-bearing value of unknown shape.
    Object,
    /// An imported module. Module calls never default to mutation; a
    /// module-level function reads its arguments, it does not rewrite the
    /// module.
    Module,
    /// Free call with no receiver.
    None,
}

impl ReceiverKind {
    /// Whether the null-return heuristic may assume a standard mutation of
    /// this receiver.
    #[must_use]
    pub const fn mutation_eligible(self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Object)
    }
}

// =============================================================================
// CALL EFFECTS
// =============================================================================

/// The resolver's verdict on what an opaque call did.
///
/// Structural verdicts (`ListAppend` through `MapRemoveKey`) are converted
/// into precise container operations by the tracer; `StandardMutation`
/// invalidates the receiver's elements wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CallEffect {
    /// The call changed nothing the graph tracks.
    NoEffect,
    /// The receiver was mutated in a way the graph cannot model precisely.
    StandardMutation,
    /// The positional argument at `index` was mutated wholesale.
    MutateArgument {
        /// Zero-based positional argument index.
        index: usize,
    },
    /// `receiver.append(x)`.
    ListAppend,
    /// `receiver.insert(i, x)`.
    ListInsert,
    /// `receiver.extend(xs)`.
    ListExtend,
    /// `receiver.remove(x)`: drop the first element equal to the argument.
    ListRemoveValue,
    /// `receiver.pop()` / `receiver.pop(i)`.
    ListPop,
    /// `receiver.clear()` on any container.
    ContainerClear,
    /// `receiver.pop(key)` on a keyed container.
    MapRemoveKey,
}

/// Correction for callees whose return value misleads the null-return
/// heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnOverride {
    /// Mutates its receiver even though it returns a value.
    AlwaysMutates,
    /// Effect-free even when it returns nothing.
    NeverMutates,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Strategy tables deciding the effect of opaque calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResolver {
    specific: BTreeMap<(ReceiverKind, String), CallEffect>,
    kind_defaults: BTreeMap<ReceiverKind, CallEffect>,
    return_overrides: BTreeMap<String, ReturnOverride>,
}

impl Default for CallResolver {
    fn default() -> Self {
        Self::seeded()
    }
}

impl CallResolver {
    /// A resolver with no entries at all; every call falls through to the
    /// null-return heuristic.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            specific: BTreeMap::new(),
            kind_defaults: BTreeMap::new(),
            return_overrides: BTreeMap::new(),
        }
    }

    /// A resolver seeded with the structural container methods and the
    /// stock heuristic corrections.
    #[must_use]
    pub fn seeded() -> Self {
        let mut r = Self::empty();

        r.register(ReceiverKind::List, "append", CallEffect::ListAppend);
        r.register(ReceiverKind::List, "insert", CallEffect::ListInsert);
        r.register(ReceiverKind::List, "extend", CallEffect::ListExtend);
        r.register(ReceiverKind::List, "remove", CallEffect::ListRemoveValue);
        r.register(ReceiverKind::List, "pop", CallEffect::ListPop);
        r.register(ReceiverKind::List, "clear", CallEffect::ContainerClear);
        // In-place reorders move every position at once
        r.register(ReceiverKind::List, "sort", CallEffect::StandardMutation);
        r.register(ReceiverKind::List, "reverse", CallEffect::StandardMutation);

        r.register(ReceiverKind::Map, "pop", CallEffect::MapRemoveKey);
        r.register(ReceiverKind::Map, "clear", CallEffect::ContainerClear);
        // Merged keys are unknowable without seeing the argument's contents
        r.register(ReceiverKind::Map, "update", CallEffect::StandardMutation);
        r.register(ReceiverKind::Map, "setdefault", CallEffect::StandardMutation);

        r.register(
            ReceiverKind::Module,
            "shuffle",
            CallEffect::MutateArgument { index: 0 },
        );

        r.register_kind_default(ReceiverKind::Module, CallEffect::NoEffect);
        r.register_kind_default(ReceiverKind::None, CallEffect::NoEffect);

        r.register_return_override("pop", ReturnOverride::AlwaysMutates);
        r.register_return_override("setdefault", ReturnOverride::AlwaysMutates);
        r.register_return_override("get", ReturnOverride::NeverMutates);
        r.register_return_override("keys", ReturnOverride::NeverMutates);
        r.register_return_override("values", ReturnOverride::NeverMutates);
        r.register_return_override("items", ReturnOverride::NeverMutates);
        r.register_return_override("copy", ReturnOverride::NeverMutates);
        r.register_return_override("index", ReturnOverride::NeverMutates);
        r.register_return_override("count", ReturnOverride::NeverMutates);

        r
    }

    /// Register an exact `(receiver kind, callee)` entry. Later registrations
    /// replace earlier ones.
    pub fn register(&mut self, receiver: ReceiverKind, callee: &str, effect: CallEffect) {
        self.specific.insert((receiver, callee.to_string()), effect);
    }

    /// Register the fallback effect for every unknown callee on a receiver
    /// kind.
    pub fn register_kind_default(&mut self, receiver: ReceiverKind, effect: CallEffect) {
        self.kind_defaults.insert(receiver, effect);
    }

    /// Register a heuristic correction for a callee name.
    pub fn register_return_override(&mut self, callee: &str, over: ReturnOverride) {
        self.return_overrides.insert(callee.to_string(), over);
    }

    /// Whether the tables hold a decisive entry for this call, meaning the
    /// tracer needs nothing from inside the call body.
    #[must_use]
    pub fn knows(&self, receiver: ReceiverKind, callee: &str) -> bool {
        self.specific.contains_key(&(receiver, callee.to_string()))
            || self.kind_defaults.contains_key(&receiver)
    }

    /// Decide the effect of a call.
    ///
    /// `returned_null` is whether the call produced no value; it only
    /// matters when both table layers miss and the heuristic decides.
    #[must_use]
    pub fn resolve(
        &self,
        receiver: ReceiverKind,
        callee: &str,
        returned_null: bool,
    ) -> CallEffect {
        if let Some(effect) = self.specific.get(&(receiver, callee.to_string())) {
            return *effect;
        }
        if let Some(effect) = self.kind_defaults.get(&receiver) {
            return *effect;
        }
        let assume_mutation = match self.return_overrides.get(callee) {
            Some(ReturnOverride::AlwaysMutates) => true,
            Some(ReturnOverride::NeverMutates) => false,
            None => returned_null,
        };
        if assume_mutation && receiver.mutation_eligible() {
            CallEffect::StandardMutation
        } else {
            CallEffect::NoEffect
        }
    }

    /// Number of entries across all three tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specific.len() + self.kind_defaults.len() + self.return_overrides.len()
    }

    /// Whether no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
