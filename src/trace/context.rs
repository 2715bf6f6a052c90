//! Trace contexts and the scoped/interactive context store.
//!
//! A [`TraceContext`] is producer-private state for one logical task:
//! nesting depth, function stack, source identity, and per-scope filters.
//! It is never serialized.
//!
//! Scoped mode attaches a context to the dynamic extent of a future via a
//! tokio task-local, so the context follows continuations across `.await`
//! and two concurrently running scopes observe independent state.
//! Interactive mode pins one persistent context that all operations observe
//! and mutate; it is not safe under overlapping tasks and callers accept
//! that.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::filter::FilterSet;

/// One pushed frame of a traced call.
#[derive(Debug, Clone)]
pub struct FunctionFrame {
    pub function_name: String,
    pub start: Instant,
    /// Nesting depth this frame was entered at
    pub level: u32,
}

/// Producer-private per-task trace state.
#[derive(Debug)]
pub struct TraceContext {
    pub thread_id: u64,
    pub nesting_level: u32,
    pub function_stack: Vec<FunctionFrame>,
    pub source: String,
    /// Scope-local filters; when empty the tracer-level filters apply
    pub filters: FilterSet,
}

impl TraceContext {
    pub fn new(thread_id: u64, source: String) -> Self {
        Self {
            thread_id,
            nesting_level: 0,
            function_stack: Vec::new(),
            source,
            filters: FilterSet::default(),
        }
    }

    /// Snapshot for a nested scope: same identity and filters, current
    /// depth and stack carried over.
    pub fn snapshot(&self) -> Self {
        Self {
            thread_id: self.thread_id,
            nesting_level: self.nesting_level,
            function_stack: self.function_stack.clone(),
            source: self.source.clone(),
            filters: self.filters.clone(),
        }
    }
}

/// Shared handle to a context.
pub type ContextHandle = Arc<Mutex<TraceContext>>;

/// Overrides applied when entering a scope; unset fields inherit.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    pub source: Option<String>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

impl ScopeConfig {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_include_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Apply the overrides to a context.
    pub fn overlay(&self, ctx: &mut TraceContext) {
        if let Some(source) = &self.source {
            ctx.source = source.clone();
        }
        if self.include_patterns.is_some() || self.exclude_patterns.is_some() {
            ctx.filters = FilterSet::compile(
                self.include_patterns.as_deref().unwrap_or(&[]),
                self.exclude_patterns.as_deref().unwrap_or(&[]),
            );
        }
    }
}

tokio::task_local! {
    /// Context attached to the currently executing scope, if any.
    pub(crate) static SCOPE_CONTEXT: ContextHandle;
}

/// The context attached to the current scope, when inside one.
pub(crate) fn scope_context() -> Option<ContextHandle> {
    SCOPE_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}
