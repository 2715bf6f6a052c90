//! Tracefab - distributed hierarchical tracing and logging fabric
//!
//! Producer clients emit structured log and trace events over a persistent
//! bidirectional link to a central broker, which routes, persists, and
//! re-broadcasts them to subscribed consumers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PRODUCER                             │
//! │  trace/   context engine: nesting, scopes, filters           │
//! │  sink/    local file/console sinks                           │
//! │  link/    reconnecting NDJSON transport + frame envelope     │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ frames
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          BROKER                              │
//! │  broker/  route matching, persistence, subscription fan-out  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`event`] | Wire schema: `Event`, `Level`, payload sanitization |
//! | [`trace`] | Producer context engine: entry/exit discipline, scopes |
//! | [`sink`] | Local sinks with the deterministic pipe-indented line format |
//! | [`link`] | Frame envelope and reconnecting transport with backoff |
//! | [`broker`] | Fan-out server: routes, subscriptions, capture, stats |
//! | [`config`] | Broker JSON configuration |
//! | [`error`] | Error types with stable codes |

pub mod broker;
pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod sink;
pub mod trace;

// Error types
pub use error::{Result, TracefabError};

// Wire schema
pub use event::{sanitize, Event, Level, TraceData, TraceKind};

// Producer engine
pub use trace::{ScopeConfig, TraceInfo, Tracer, TracerBuilder, TracerConfig};

// Link transport
pub use link::{BackoffPolicy, Frame, Link, LinkConfig, LinkState, StatusKind, SubscriptionFilters};

// Broker
pub use broker::{Broker, BrokerHandle, CaptureMode, FilterRule, RouteConfig, StatsSnapshot};

// Configuration
pub use config::BrokerConfig;
