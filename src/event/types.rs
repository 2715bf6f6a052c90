//! Log and trace event types shared by producer and broker.
//!
//! An [`Event`] is the unit transmitted on the link. A plain log event has
//! `trace: None`; a trace event carries a [`TraceData`] section (entry/exit
//! markers, function name, timing). Wire field names are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Entry,
    Exit,
    Log,
    Error,
}

/// Trace-specific fields, flattened into the event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceData {
    pub kind: TraceKind,
    pub function_name: String,
    /// Call arguments (entry events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// Return value (exit events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    /// Wall-clock duration of the traced call in milliseconds (exit events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
}

/// A single log or trace record.
///
/// `id` is producer-assigned and unique within one producer session; the
/// broker treats it as opaque. `thread_id` identifies the producer context
/// that emitted the event and `nesting_level` its call-stack depth at
/// emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// ISO-8601 wall time, producer-assigned at creation
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    /// Producer identity (e.g., hostname)
    pub source: String,
    pub thread_id: u64,
    pub nesting_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Captured call-site frames, for errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(flatten)]
    pub trace: Option<TraceData>,
}

impl Event {
    pub fn is_trace(&self) -> bool {
        self.trace.is_some()
    }

    pub fn trace_kind(&self) -> Option<TraceKind> {
        self.trace.as_ref().map(|t| t.kind)
    }

    /// Entry and exit events render their raw `>>> Call` / `<<< Exit`
    /// markers; everything else is styled as a plain log line.
    pub fn is_frame_marker(&self) -> bool {
        matches!(self.trace_kind(), Some(TraceKind::Entry | TraceKind::Exit))
    }
}
