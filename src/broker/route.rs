//! Route configuration and longest-prefix matching.
//!
//! Configured routes form a flat list of path prefixes. An incoming event
//! route selects the longest matching prefix; `"/"` matches everything.
//! Matching is boundary-aware: `/trace` covers `/trace` and `/trace/x`,
//! never `/tracex`.

use serde::{Deserialize, Serialize};

/// What part of a dispatched event a sink record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    /// `{timestamp, clientId, route, type, data}`
    Full,
    /// `{timestamp, data}`
    PayloadOnly,
    /// the event alone
    BodyOnly,
}

/// On-disk record format. `json` and `jsonl` are synonyms (one object per
/// line); `text` renders the event message with a timestamp tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Text,
    Json,
    Jsonl,
}

/// Persistence policy for one route prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub route_prefix: String,
    /// `"console"` for stdout, otherwise a file path
    pub output: String,
    pub capture: CaptureMode,
    #[serde(default = "default_format")]
    pub format: RecordFormat,
}

fn default_format() -> RecordFormat {
    RecordFormat::Jsonl
}

impl RouteConfig {
    pub fn console(route_prefix: impl Into<String>, capture: CaptureMode) -> Self {
        Self {
            route_prefix: route_prefix.into(),
            output: "console".to_string(),
            capture,
            format: RecordFormat::Jsonl,
        }
    }

    pub fn file(
        route_prefix: impl Into<String>,
        path: impl Into<String>,
        capture: CaptureMode,
    ) -> Self {
        Self {
            route_prefix: route_prefix.into(),
            output: path.into(),
            capture,
            format: RecordFormat::Jsonl,
        }
    }

    pub fn is_console(&self) -> bool {
        self.output == "console"
    }
}

/// Boundary-aware path prefix test, used for both route configs and
/// subscription scopes.
pub fn prefix_matches(prefix: &str, route: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match route.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The configured route list with longest-prefix resolution.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// Longest-prefix match; `None` when no configured route covers the
    /// incoming route.
    pub fn resolve(&self, route: &str) -> Option<(usize, &RouteConfig)> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(_, cfg)| prefix_matches(&cfg.route_prefix, route))
            .max_by_key(|(_, cfg)| cfg.route_prefix.len())
    }
}
