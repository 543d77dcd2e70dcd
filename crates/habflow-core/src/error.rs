// ── Core error types ──
//
// Errors surfaced by controllers and flow nodes. Transport failures from
// habflow-api are folded into `Communication`, keeping the HTTP status
// when there was one.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// A request failed in transport or with an HTTP error status.
    #[error("{message}")]
    Communication {
        message: String,
        status: Option<u16>,
        timed_out: bool,
    },

    /// The server is reachable but still starting (503).
    #[error("Server not ready: {message}")]
    ServerNotReady { message: String, status: Option<u16> },

    #[error("Controller has been shut down")]
    ShutDown,

    // ── Node errors ──────────────────────────────────────────────────
    #[error("Unknown controller '{name}'")]
    UnknownController { name: String },

    #[error("No item specified")]
    NoItem,

    #[error("No payload specified")]
    NoPayload,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status of a failed request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Communication { status, .. } | Self::ServerNotReady { status, .. } => *status,
            _ => None,
        }
    }

    /// `true` for failures talking to the server.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. } | Self::ServerNotReady { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<habflow_api::Error> for CoreError {
    fn from(err: habflow_api::Error) -> Self {
        use habflow_api::Error as Api;

        match err {
            Api::Status { status: 503, .. } => Self::ServerNotReady {
                message: err.to_string(),
                status: Some(503),
            },
            Api::Status { status, .. } => Self::Communication {
                message: err.to_string(),
                status: Some(status),
                timed_out: false,
            },
            Api::Transport { timed_out, .. } => Self::Communication {
                message: err.to_string(),
                status: None,
                timed_out,
            },
            Api::InvalidHeader(_) | Api::Tls(_) => Self::Config {
                message: err.to_string(),
            },
            Api::Deserialization { .. } | Api::MalformedFrame(_) => Self::Internal(err.to_string()),
        }
    }
}
