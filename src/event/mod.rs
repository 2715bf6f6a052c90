//! Event Module - wire schema shared by producer and broker.
//!
//! Key types:
//! - `Event`: log/trace record with id + timestamp + context fields
//! - `Level`, `TraceKind`: severity and trace marker kinds
//! - `sanitize`: payload depth guard with the `"[Circular]"` sentinel

mod payload;
mod types;

pub use payload::{sanitize, CIRCULAR_SENTINEL, DEFAULT_MAX_DEPTH};
pub use types::{Event, Level, TraceData, TraceKind};
