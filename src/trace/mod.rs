//! Trace Context Engine - producer-side hierarchical tracing.
//!
//! Key types:
//! - `Tracer`: entry/exit discipline, filter evaluation, emission
//! - `TraceContext` / `ScopeConfig`: per-task state and scope overrides
//! - `FilterSet`: include-wins pattern evaluation

mod context;
mod engine;
mod filter;

pub use context::{ContextHandle, FunctionFrame, ScopeConfig, TraceContext};
pub use engine::{TraceInfo, Tracer, TracerBuilder, TracerConfig};
pub use filter::{FilterSet, Pattern};
