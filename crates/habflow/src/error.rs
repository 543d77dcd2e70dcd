//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use habflow_config::ConfigError;
use habflow_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the server: {message}")]
    #[diagnostic(
        code(habflow::connection_failed),
        help(
            "Check that openHAB is running and reachable.\n\
             Try: habflow items --host <host> --port 8080"
        )
    )]
    ConnectionFailed { message: String },

    #[error("Server is still starting")]
    #[diagnostic(
        code(habflow::not_ready),
        help("openHAB answered 503. Wait for startup to finish and try again.")
    )]
    ServerNotReady,

    #[error("Request timed out: {message}")]
    #[diagnostic(
        code(habflow::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed (HTTP {status})")]
    #[diagnostic(
        code(habflow::auth_failed),
        help(
            "Verify your API token or credentials.\n\
             Run: habflow config set-token --for {profile}"
        )
    )]
    AuthFailed { status: u16, profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Item not found: {message}")]
    #[diagnostic(
        code(habflow::not_found),
        help("Run: habflow items to see available items")
    )]
    NotFound { message: String },

    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(habflow::api_error))]
    Api { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(habflow::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(habflow::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: habflow config init --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(habflow::no_config),
        help(
            "Create a profile with: habflow config init --host <host>\n\
             or pass --host. Config expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(habflow::config))]
    Config(ConfigError),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(habflow::internal))]
    Internal(String),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ServerNotReady => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to auth failures.
    pub fn for_profile(self, name: &str) -> Self {
        match self {
            Self::AuthFailed { status, .. } => Self::AuthFailed {
                status,
                profile: name.to_owned(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Communication {
                timed_out: true,
                message,
                ..
            } => Self::Timeout { message },
            CoreError::Communication {
                status: Some(status @ (401 | 403)),
                ..
            } => Self::AuthFailed {
                status,
                profile: "default".into(),
            },
            CoreError::Communication {
                status: Some(404),
                message,
                ..
            } => Self::NotFound { message },
            CoreError::Communication {
                status: Some(_),
                message,
                ..
            } => Self::Api { message },
            CoreError::Communication {
                status: None,
                message,
                ..
            } => Self::ConnectionFailed { message },
            CoreError::ServerNotReady { .. } => Self::ServerNotReady,
            CoreError::NoItem => Self::Validation {
                field: "item".into(),
                reason: "no item given".into(),
            },
            CoreError::NoPayload => Self::Validation {
                field: "payload".into(),
                reason: "no payload given".into(),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other @ (CoreError::ShutDown
            | CoreError::UnknownController { .. }
            | CoreError::Internal(_)) => Self::Internal(other.to_string()),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn communication(status: Option<u16>, timed_out: bool) -> CoreError {
        CoreError::Communication {
            message: "boom".into(),
            status,
            timed_out,
        }
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let cases = [
            (communication(None, false), exit_code::CONNECTION),
            (communication(None, true), exit_code::TIMEOUT),
            (communication(Some(401), false), exit_code::AUTH),
            (communication(Some(404), false), exit_code::NOT_FOUND),
            (communication(Some(500), false), exit_code::GENERAL),
            (CoreError::ServerNotReady { message: "503".into(), status: Some(503) }, exit_code::CONNECTION),
            (CoreError::NoPayload, exit_code::USAGE),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn auth_failure_names_profile() {
        let err = CliError::from(communication(Some(403), false)).for_profile("cabin");
        assert!(matches!(err, CliError::AuthFailed { ref profile, .. } if profile == "cabin"));
    }
}
