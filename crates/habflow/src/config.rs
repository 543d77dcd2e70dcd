//! CLI configuration: thin wrapper around `habflow_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--host, --token, etc.).

use std::time::Duration;

use secrecy::SecretString;

use habflow_api::{ConnectionConfig, TlsMode};
use habflow_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use habflow_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config, store_token,
};

/// Controller name used when no profile backs the connection.
const FLAGS_ONLY: &str = "cli";

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
pub fn resolve_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let base =
            habflow_config::profile_to_controller_config(profile, &profile_name, &cfg.defaults)?;
        return Ok(apply_overrides(base, global));
    }

    // A named profile that does not exist is an error; the implicit
    // default may be replaced by --host.
    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }
    let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;

    let base = ControllerConfig {
        stream: habflow_config::stream_tuning(&cfg.defaults)?,
        sync_retry: Duration::from_secs(cfg.defaults.sync_retry_secs),
        ..ControllerConfig::new(ConnectionConfig::new(host)).with_name(FLAGS_ONLY)
    };
    let mut config = apply_overrides(base, global);
    config.transport.timeout =
        Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout_secs));
    Ok(config)
}

/// Flag values win over whatever the profile resolved.
fn apply_overrides(mut config: ControllerConfig, global: &GlobalOpts) -> ControllerConfig {
    if let Some(ref host) = global.host {
        config.connection.host.clone_from(host);
    }
    if global.port.is_some() {
        config.connection.port = global.port;
    }
    if let Some(ref token) = global.token {
        config.connection.token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        config.transport.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.transport.timeout = Duration::from_secs(secs);
    }
    config
}
