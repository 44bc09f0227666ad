//! # Dependency-Context Stack
//!
//! Edge-writing code runs "within" a dependency context, and every edge it
//! records is attributed to that context. Selection is an explicit stack
//! owned by the tracer — never thread-local ambient state — so interleaved
//! analysis work cannot cross-contaminate attribution and behavior stays
//! reproducible. Contexts nest; they do not overlap within one logical task.

use crate::types::DepContext;

/// Explicit push/pop stack of active dependency contexts.
///
/// The empty stack reads as [`DepContext::Dynamic`]: observing real
/// execution is the default mode.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    frames: Vec<DepContext>,
}

impl ContextStack {
    /// Create an empty stack (active context: dynamic).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The context edges are currently attributed to.
    #[must_use]
    pub fn active(&self) -> DepContext {
        self.frames.last().copied().unwrap_or(DepContext::Dynamic)
    }

    /// Enter a context. Must be paired with [`ContextStack::pop`].
    pub fn push(&mut self, ctx: DepContext) {
        self.frames.push(ctx);
    }

    /// Leave the innermost context. Returns it, or `None` at the base.
    pub fn pop(&mut self) -> Option<DepContext> {
        self.frames.pop()
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
