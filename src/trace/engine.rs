//! The producer tracing engine.
//!
//! A [`Tracer`] resolves a context per operation (interactive → scoped →
//! lazily-created current), maintains entry/exit symmetry, evaluates
//! filters, renders to local sinks, and offers frames to the link.
//!
//! Nesting discipline:
//! - `trace_entry` increments the depth, pushes a frame, and emits at the
//!   incremented depth
//! - `trace_exit` pops, emits at the current depth, **then** decrements
//!   (saturating at 0) so entry and exit render at identical indent
//! - plain logs inside a frame carry `depth + 1`, children of the frame

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::event::{sanitize, Event, Level, TraceData, TraceKind};
use crate::link::{Frame, Link, LinkState};
use crate::sink::{render_line, ConsoleSink, FileSink, LocalSink};

use super::context::{
    scope_context, ContextHandle, FunctionFrame, ScopeConfig, TraceContext, SCOPE_CONTEXT,
};
use super::filter::FilterSet;

/// Producer configuration.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Master switch for trace events (entry/exit markers)
    pub enabled: bool,
    /// Producer identity stamped on every event
    pub source: String,
    /// Drop emissions from contexts nested deeper than this; `None` is unlimited
    pub max_trace_level: Option<u32>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Call-site frames appended to error messages; 0 disables capture
    pub error_stack_depth: usize,
    /// Route stamped on outbound frames
    pub route: Option<String>,
    /// Depth guard for structured payloads
    pub sanitize_depth: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: default_source(),
            max_trace_level: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            error_stack_depth: 10,
            route: None,
            sanitize_depth: crate::event::DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_source() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string())
}

impl TracerConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_max_trace_level(mut self, level: Option<u32>) -> Self {
        self.max_trace_level = level;
        self
    }

    pub fn with_include_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_error_stack_depth(mut self, depth: usize) -> Self {
        self.error_stack_depth = depth;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }
}

/// Diagnostic snapshot of the active context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceInfo {
    pub interactive: bool,
    pub thread_id: u64,
    pub nesting_level: u32,
    pub function_stack: Vec<String>,
}

struct TracerInner {
    config: TracerConfig,
    filters: FilterSet,
    interactive: Mutex<Option<ContextHandle>>,
    current: Mutex<Option<ContextHandle>>,
    next_thread_id: AtomicU64,
    next_seq: AtomicU64,
    session: String,
    sinks: Vec<Box<dyn LocalSink>>,
    link: Option<Link>,
}

/// Builds a [`Tracer`] with its local sinks and optional link.
pub struct TracerBuilder {
    config: TracerConfig,
    sinks: Vec<Box<dyn LocalSink>>,
    link: Option<Link>,
}

impl TracerBuilder {
    pub fn file_sink(mut self, path: impl AsRef<std::path::Path>, truncate: bool) -> Result<Self> {
        self.sinks.push(Box::new(FileSink::create(path, truncate)?));
        Ok(self)
    }

    pub fn console_sink(mut self) -> Self {
        self.sinks.push(Box::new(ConsoleSink::new()));
        self
    }

    pub fn sink(mut self, sink: Box<dyn LocalSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }

    pub fn build(self) -> Tracer {
        let filters = FilterSet::compile(&self.config.include_patterns, &self.config.exclude_patterns);
        Tracer {
            inner: Arc::new(TracerInner {
                filters,
                interactive: Mutex::new(None),
                current: Mutex::new(None),
                next_thread_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
                session: format!("{:08x}", rand::random::<u32>()),
                sinks: self.sinks,
                link: self.link,
                config: self.config,
            }),
        }
    }
}

/// The producer-side tracing engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// A serverless tracer: no sinks, no link. Emissions evaluate filters
    /// and are then dropped.
    pub fn new(config: TracerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: TracerConfig) -> TracerBuilder {
        TracerBuilder {
            config,
            sinks: Vec::new(),
            link: None,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.inner.config
    }

    pub fn link_state(&self) -> Option<LinkState> {
        self.inner.link.as_ref().map(|l| l.state())
    }

    /// Close the link, if any. Queued frames are lost; local sinks keep
    /// working (serverless-equivalent).
    pub fn close(&self) {
        if let Some(link) = &self.inner.link {
            link.close();
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Context lifecycle
    // ═══════════════════════════════════════════════════════════════

    fn new_context(&self) -> TraceContext {
        let thread_id = self.inner.next_thread_id.fetch_add(1, Ordering::SeqCst);
        TraceContext::new(thread_id, self.inner.config.source.clone())
    }

    /// Resolution order: interactive, then the scope-attached context, then
    /// a lazily-created current context.
    fn resolve_context(&self) -> ContextHandle {
        if let Some(ctx) = self.inner.interactive.lock().clone() {
            return ctx;
        }
        if let Some(ctx) = scope_context() {
            return ctx;
        }
        let mut current = self.inner.current.lock();
        current
            .get_or_insert_with(|| Arc::new(Mutex::new(self.new_context())))
            .clone()
    }

    /// Switch to a single persistent context that accumulates state across
    /// discrete commands. Not safe under overlapping tasks.
    pub fn enable_interactive(&self) {
        let mut slot = self.inner.interactive.lock();
        if slot.is_none() {
            *slot = Some(Arc::new(Mutex::new(self.new_context())));
        }
    }

    pub fn disable_interactive(&self) {
        *self.inner.interactive.lock() = None;
    }

    pub fn is_interactive(&self) -> bool {
        self.inner.interactive.lock().is_some()
    }

    /// Discard accumulated context state. Interactive mode stays enabled
    /// with a fresh context; the lazily-created current context is dropped.
    pub fn reset_context(&self) {
        let mut slot = self.inner.interactive.lock();
        if slot.is_some() {
            *slot = Some(Arc::new(Mutex::new(self.new_context())));
        }
        drop(slot);
        *self.inner.current.lock() = None;
    }

    pub fn trace_info(&self) -> TraceInfo {
        let interactive = self.is_interactive();
        let ctx = self.resolve_context();
        let guard = ctx.lock();
        TraceInfo {
            interactive,
            thread_id: guard.thread_id,
            nesting_level: guard.nesting_level,
            function_stack: guard
                .function_stack
                .iter()
                .map(|f| f.function_name.clone())
                .collect(),
        }
    }

    /// Run a future with its own scoped context. Nested scopes inherit the
    /// parent context and overlay `config`; a top-level scope allocates a
    /// fresh thread id. The context follows the future across `.await` and
    /// is popped on every exit path, including cancellation.
    pub async fn run_scoped<F>(&self, config: ScopeConfig, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        SCOPE_CONTEXT.scope(self.new_scope_context(&config), fut).await
    }

    /// Synchronous variant of [`Tracer::run_scoped`].
    pub fn scoped<R>(&self, config: ScopeConfig, f: impl FnOnce() -> R) -> R {
        SCOPE_CONTEXT.sync_scope(self.new_scope_context(&config), f)
    }

    fn new_scope_context(&self, config: &ScopeConfig) -> ContextHandle {
        let mut ctx = match scope_context() {
            Some(parent) => parent.lock().snapshot(),
            None => self.new_context(),
        };
        config.overlay(&mut ctx);
        Arc::new(Mutex::new(ctx))
    }

    // ═══════════════════════════════════════════════════════════════
    // Trace operations
    // ═══════════════════════════════════════════════════════════════

    /// Enter a traced call: bump the depth, push the frame, emit the
    /// `>>> Call` marker at the new depth.
    pub fn trace_entry(&self, name: &str, args: Option<Vec<Value>>) {
        if !self.inner.config.enabled {
            return;
        }
        let ctx = self.resolve_context();
        let mut guard = ctx.lock();
        guard.nesting_level += 1;
        let level = guard.nesting_level;
        guard.function_stack.push(FunctionFrame {
            function_name: name.to_string(),
            start: Instant::now(),
            level,
        });

        let args = args.map(|a| {
            a.iter()
                .map(|v| sanitize(v, self.inner.config.sanitize_depth))
                .collect::<Vec<_>>()
        });
        let message = match &args {
            Some(a) if !a.is_empty() => format!(
                ">>> Call {} {}",
                name,
                serde_json::to_string(a).unwrap_or_default()
            ),
            _ => format!(">>> Call {}", name),
        };

        let event = self.build_event(
            Level::Debug,
            message,
            &guard,
            guard.nesting_level,
            Some(TraceData {
                kind: TraceKind::Entry,
                function_name: name.to_string(),
                args,
                return_value: None,
                execution_time: None,
            }),
        );
        self.deliver(event, &guard);
    }

    /// Leave a traced call: pop LIFO by name (a mismatch is diagnosed but
    /// still recorded), emit the `<<< Exit` marker at the entry's depth,
    /// then decrement.
    pub fn trace_exit(&self, name: &str, return_value: Option<Value>, error: Option<&str>) {
        if !self.inner.config.enabled {
            return;
        }
        let ctx = self.resolve_context();
        let mut guard = ctx.lock();

        let execution_time = match guard.function_stack.pop() {
            Some(frame) => {
                if frame.function_name != name {
                    tracing::warn!(
                        expected = %frame.function_name,
                        got = name,
                        "Trace exit does not match innermost entry"
                    );
                }
                Some(frame.start.elapsed().as_millis() as u64)
            }
            None => {
                tracing::warn!(function = name, "Trace exit without matching entry");
                None
            }
        };

        let return_value = return_value.map(|v| sanitize(&v, self.inner.config.sanitize_depth));
        let message = match (error, &return_value) {
            (Some(_), _) => format!("<<< Exit {} ERROR", name),
            (None, Some(v)) => format!(
                "<<< Exit {} {}",
                name,
                serde_json::to_string(v).unwrap_or_default()
            ),
            (None, None) => format!("<<< Exit {}", name),
        };
        let level = if error.is_some() {
            Level::Error
        } else {
            Level::Debug
        };

        let event = self.build_event(
            level,
            message,
            &guard,
            guard.nesting_level,
            Some(TraceData {
                kind: TraceKind::Exit,
                function_name: name.to_string(),
                args: None,
                return_value,
                execution_time,
            }),
        );
        self.deliver(event, &guard);

        // Emission precedes the decrement so entry and exit share an indent
        guard.nesting_level = guard.nesting_level.saturating_sub(1);
    }

    /// Emit a plain log event. Inside a traced frame the event is a child
    /// of that frame: one level below it, tagged with its function name.
    pub fn log(&self, level: Level, message: &str, data: Option<Value>) {
        let ctx = self.resolve_context();
        let guard = ctx.lock();

        let depth = if guard.function_stack.is_empty() {
            guard.nesting_level
        } else {
            guard.nesting_level + 1
        };
        let trace = guard.function_stack.last().map(|frame| TraceData {
            kind: if level == Level::Error {
                TraceKind::Error
            } else {
                TraceKind::Log
            },
            function_name: frame.function_name.clone(),
            args: None,
            return_value: None,
            execution_time: None,
        });

        let mut event = self.build_event(level, message.to_string(), &guard, depth, trace);
        event.data = data.map(|v| sanitize(&v, self.inner.config.sanitize_depth));
        self.deliver(event, &guard);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message, None);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message, None);
    }

    // ═══════════════════════════════════════════════════════════════
    // Traced execution
    // ═══════════════════════════════════════════════════════════════

    /// Trace a synchronous call. A panic during `f` still emits an error
    /// exit before unwinding.
    pub fn exec<T, F>(&self, name: &str, args: Option<Vec<Value>>, f: F) -> T
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        self.trace_entry(name, args);
        let mut guard = ExitGuard::new(self, name);
        let out = f();
        guard.disarm();
        self.trace_exit(name, serde_json::to_value(&out).ok(), None);
        out
    }

    /// Trace a fallible call: an `Err` emits an error exit and propagates.
    pub fn try_exec<T, E, F>(&self, name: &str, args: Option<Vec<Value>>, f: F) -> std::result::Result<T, E>
    where
        T: Serialize,
        E: std::fmt::Display,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.trace_entry(name, args);
        let mut guard = ExitGuard::new(self, name);
        let out = f();
        guard.disarm();
        match out {
            Ok(value) => {
                self.trace_exit(name, serde_json::to_value(&value).ok(), None);
                Ok(value)
            }
            Err(err) => {
                self.trace_exit(name, None, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    /// Trace an asynchronous call: the exit is chained to the future's
    /// settlement. If the future is dropped before completing (caller
    /// cancellation), an error exit is emitted before the context unwinds.
    pub async fn exec_async<T, F>(&self, name: &str, args: Option<Vec<Value>>, fut: F) -> T
    where
        T: Serialize,
        F: std::future::Future<Output = T>,
    {
        self.trace_entry(name, args);
        let mut guard = ExitGuard::new(self, name);
        let out = fut.await;
        guard.disarm();
        self.trace_exit(name, serde_json::to_value(&out).ok(), None);
        out
    }

    /// Asynchronous variant of [`Tracer::try_exec`].
    pub async fn try_exec_async<T, E, F>(
        &self,
        name: &str,
        args: Option<Vec<Value>>,
        fut: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize,
        E: std::fmt::Display,
        F: std::future::Future<Output = std::result::Result<T, E>>,
    {
        self.trace_entry(name, args);
        let mut guard = ExitGuard::new(self, name);
        let out = fut.await;
        guard.disarm();
        match out {
            Ok(value) => {
                self.trace_exit(name, serde_json::to_value(&value).ok(), None);
                Ok(value)
            }
            Err(err) => {
                self.trace_exit(name, None, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    /// Wrap a function so every invocation runs under [`Tracer::exec`] with
    /// the given name override.
    pub fn wrap<A, T, F>(&self, name: &str, f: F) -> impl Fn(A) -> T
    where
        A: Serialize,
        T: Serialize,
        F: Fn(A) -> T,
    {
        let tracer = self.clone();
        let name = name.to_string();
        move |arg: A| {
            let args = serde_json::to_value(&arg).ok().map(|v| vec![v]);
            tracer.exec(&name, args, || f(arg))
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Emission
    // ═══════════════════════════════════════════════════════════════

    fn build_event(
        &self,
        level: Level,
        message: String,
        ctx: &TraceContext,
        depth: u32,
        trace: Option<TraceData>,
    ) -> Event {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let (message, stack) = self.enrich_error(level, message);
        Event {
            id: format!("{}-{}", self.inner.session, seq),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level,
            message,
            source: ctx.source.clone(),
            thread_id: ctx.thread_id,
            nesting_level: depth,
            data: None,
            stack,
            trace,
        }
    }

    /// For errors, append up to `error_stack_depth` call-site frames.
    fn enrich_error(&self, level: Level, message: String) -> (String, Option<String>) {
        let depth = self.inner.config.error_stack_depth;
        if level != Level::Error || depth == 0 {
            return (message, None);
        }
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
        let frames: Vec<&str> = backtrace.lines().map(str::trim_end).take(depth).collect();
        if frames.is_empty() {
            return (message, None);
        }
        let stack = frames.join("\n");
        let message = format!("{}\nStack (top {}):\n{}", message, frames.len(), stack);
        (message, Some(stack))
    }

    /// Filter evaluation, then local sinks, then the link.
    fn deliver(&self, event: Event, ctx: &TraceContext) {
        if event.is_trace() && !self.inner.config.enabled {
            return;
        }
        if let Some(max) = self.inner.config.max_trace_level {
            if ctx.nesting_level > max {
                return;
            }
        }
        let filters = if ctx.filters.is_empty() {
            &self.inner.filters
        } else {
            &ctx.filters
        };
        if !filters.passes(&event.message) {
            return;
        }

        if !self.inner.sinks.is_empty() {
            let line = render_line(&event);
            for sink in &self.inner.sinks {
                sink.write_line(&line);
            }
        }

        if let Some(link) = &self.inner.link {
            let frame = Frame::for_event(
                event.clone(),
                Some(event.id.clone()),
                self.inner.config.route.clone(),
            );
            link.offer(frame);
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("source", &self.inner.config.source)
            .field("enabled", &self.inner.config.enabled)
            .field("interactive", &self.is_interactive())
            .field("sinks", &self.inner.sinks.len())
            .field("linked", &self.inner.link.is_some())
            .finish()
    }
}

/// Emits an error exit if a traced call unwinds (panic) or its future is
/// dropped before settlement.
struct ExitGuard<'a> {
    tracer: &'a Tracer,
    name: &'a str,
    armed: bool,
}

impl<'a> ExitGuard<'a> {
    fn new(tracer: &'a Tracer, name: &'a str) -> Self {
        Self {
            tracer,
            name,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tracer.trace_exit(self.name, None, Some("interrupted"));
        }
    }
}
