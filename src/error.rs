//! Tracefab Error Types with Error Codes
//!
//! Error code ranges:
//! - TFAB-000-009: Configuration errors
//! - TFAB-020-029: Link/transport errors
//! - TFAB-030-039: Frame/protocol errors
//! - TFAB-040-049: Sink/IO errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TracefabError>;

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum TracefabError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[TFAB-001] Config error: {reason}")]
    ConfigError { reason: String },

    #[error("[TFAB-002] Config file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("[TFAB-003] Invalid route config: {reason}")]
    InvalidRoute { reason: String },

    // ═══════════════════════════════════════════
    // LINK / TRANSPORT ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[TFAB-020] Failed to bind port {port}: {reason}")]
    BindError { port: u16, reason: String },

    #[error("[TFAB-021] Connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("[TFAB-022] Link gave up after {attempts} reconnect attempts")]
    LinkGaveUp { attempts: u32 },

    #[error("[TFAB-023] Link is closed")]
    LinkClosed,

    // ═══════════════════════════════════════════
    // FRAME / PROTOCOL ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[TFAB-030] Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("[TFAB-031] Unknown message type: {kind}")]
    UnknownMessageType { kind: String },

    #[error("[TFAB-032] No route configured for '{route}'")]
    UnknownRoute { route: String },

    // ═══════════════════════════════════════════
    // SINK / IO ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[TFAB-040] Sink write to '{path}' failed: {reason}")]
    SinkWrite { path: String, reason: String },

    #[error("[TFAB-041] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[TFAB-042] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TracefabError {
    /// Get the stable error code (e.g., "TFAB-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError { .. } => "TFAB-001",
            Self::ConfigNotFound { .. } => "TFAB-002",
            Self::InvalidRoute { .. } => "TFAB-003",
            Self::BindError { .. } => "TFAB-020",
            Self::ConnectFailed { .. } => "TFAB-021",
            Self::LinkGaveUp { .. } => "TFAB-022",
            Self::LinkClosed => "TFAB-023",
            Self::MalformedFrame { .. } => "TFAB-030",
            Self::UnknownMessageType { .. } => "TFAB-031",
            Self::UnknownRoute { .. } => "TFAB-032",
            Self::SinkWrite { .. } => "TFAB-040",
            Self::Json(_) => "TFAB-041",
            Self::Io(_) => "TFAB-042",
        }
    }

    /// Check if the error is transient (the link layer may retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::SinkWrite { .. } | Self::Io(_)
        )
    }
}
