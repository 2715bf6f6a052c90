//! Frame envelope - the single JSON object exchanged on the link.
//!
//! Both directions use the same envelope. Each frame is one line of NDJSON.
//! Producer → broker: `log`/`trace` events, `subscribe`/`unsubscribe`,
//! `ping`. Broker → producer: re-broadcast `log`/`trace`, `status` acks,
//! `pong`, `error`, plus heartbeat `ping` probes which the transport answers
//! automatically.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;

/// Per-subscription filter predicates, as declared on a `subscribe` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<crate::event::Level>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
}

impl SubscriptionFilters {
    pub fn is_empty(&self) -> bool {
        self.levels.as_ref().map_or(true, |v| v.is_empty())
            && self.sources.as_ref().map_or(true, |v| v.is_empty())
            && self.include_patterns.as_ref().map_or(true, |v| v.is_empty())
            && self.exclude_patterns.as_ref().map_or(true, |v| v.is_empty())
    }
}

/// Status values carried on `status` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Connected,
    Ok,
    Subscribed,
    Unsubscribed,
}

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<String>,
        data: Event,
    },
    Trace {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<String>,
        data: Event,
    },
    Subscribe {
        route: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<SubscriptionFilters>,
    },
    Unsubscribe {
        route: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Pong,
    Status {
        status: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Error {
        error: String,
    },
}

impl Frame {
    /// Wrap an event in the envelope variant matching its shape.
    pub fn for_event(event: Event, id: Option<String>, route: Option<String>) -> Self {
        if event.is_trace() {
            Frame::Trace {
                id,
                route,
                data: event,
            }
        } else {
            Frame::Log {
                id,
                route,
                data: event,
            }
        }
    }

    /// Broadcast form: event only, no producer id or route.
    pub fn broadcast(event: Event) -> Self {
        Self::for_event(event, None, None)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Trace { .. } => "trace",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping { .. } => "ping",
            Self::Pong => "pong",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Log { data, .. } | Self::Trace { data, .. } => Some(data),
            _ => None,
        }
    }
}
