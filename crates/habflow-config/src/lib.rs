//! Shared configuration for habflow hosts.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `habflow_core::ControllerConfig`. The CLI layers
//! its flag overrides on top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use habflow_api::{ConnectionConfig, ServerVersion, StreamTuning, TlsMode, TransportConfig};
use habflow_core::ControllerConfig;

/// Keyring service every secret is stored under.
pub const KEYRING_SERVICE: &str = "habflow";

/// Prefix of environment variables merged over the file.
pub const ENV_PREFIX: &str = "HABFLOW_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Upper bound of a single control request.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// `[min, max]` window of the random delay before the first connect.
    #[serde(default = "default_jitter")]
    pub startup_jitter_ms: [u64; 2],

    /// Wait after the event stream fails with an HTTP status.
    #[serde(default = "default_reconnect")]
    pub reconnect_delay_secs: u64,

    /// Wait after a status-less stream failure (refused, dropped).
    #[serde(default = "default_stream_retry")]
    pub stream_retry_ms: u64,

    /// Wait between initial-state sync attempts.
    #[serde(default = "default_sync_retry")]
    pub sync_retry_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout_secs: default_timeout(),
            startup_jitter_ms: default_jitter(),
            reconnect_delay_secs: default_reconnect(),
            stream_retry_ms: default_stream_retry(),
            sync_retry_secs: default_sync_retry(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_jitter() -> [u64; 2] {
    [1000, 5000]
}
fn default_reconnect() -> u64 {
    10
}
fn default_stream_retry() -> u64 {
    1000
}
fn default_sync_retry() -> u64 {
    10
}

/// A named server profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// `http` or `https`; blank means `http`.
    #[serde(default)]
    pub protocol: String,

    pub host: String,

    pub port: Option<u16>,

    /// Path the server is mounted under behind a reverse proxy.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub version: ServerVersion,

    pub username: Option<String>,

    /// Plaintext password (prefer keyring).
    pub password: Option<String>,

    /// Plaintext API token (prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the API token.
    pub token_env: Option<String>,

    /// Accept any TLS certificate.
    pub insecure: Option<bool>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override `defaults.timeout_secs`.
    pub timeout_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "habflow", "habflow").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("habflow");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then merge `HABFLOW_*` variables.
///
/// Nested keys use a double underscore:
/// `HABFLOW_DEFAULTS__TIMEOUT_SECS=3`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str, kind: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{kind}"))
}

fn keyring_secret(profile_name: &str, kind: &str) -> Option<SecretString> {
    match keyring_entry(profile_name, kind).and_then(|entry| entry.get_password()) {
        Ok(secret) => Some(SecretString::from(secret)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            debug!(profile = profile_name, kind, error = %e, "keyring lookup failed");
            None
        }
    }
}

/// Resolve the API token: `token_env` → keyring → plaintext.
///
/// `None` means the profile runs without a token.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Some(val) = profile
        .token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Some(SecretString::from(val));
    }

    if let Some(secret) = keyring_secret(profile_name, "token") {
        return Some(secret);
    }

    profile.token.clone().map(SecretString::from)
}

/// Resolve the basic-auth password: `HABFLOW_PASSWORD` → keyring → plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Ok(pw) = std::env::var("HABFLOW_PASSWORD") {
        return Some(SecretString::from(pw));
    }

    if let Some(secret) = keyring_secret(profile_name, "password") {
        return Some(secret);
    }

    profile.password.clone().map(SecretString::from)
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "token")?.set_password(token)?;
    Ok(())
}

// ── Translation to runtime config ───────────────────────────────────

/// Build the connection part of a controller config from a profile.
pub fn profile_to_connection(
    profile: &Profile,
    profile_name: &str,
) -> Result<ConnectionConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }
    match profile.protocol.trim() {
        "" | "http" | "https" => {}
        other => {
            return Err(ConfigError::Validation {
                field: "protocol".into(),
                reason: format!("expected 'http' or 'https', got '{other}'"),
            });
        }
    }

    Ok(ConnectionConfig {
        protocol: profile.protocol.trim().to_owned(),
        host: host.to_owned(),
        port: profile.port,
        path: profile.path.clone(),
        username: profile.username.clone().unwrap_or_default(),
        password: resolve_password(profile, profile_name),
        token: resolve_token(profile, profile_name),
        version: profile.version,
    })
}

/// Stream pacing from the global defaults.
pub fn stream_tuning(defaults: &Defaults) -> Result<StreamTuning, ConfigError> {
    let [min, max] = defaults.startup_jitter_ms;
    if min > max {
        return Err(ConfigError::Validation {
            field: "startup_jitter_ms".into(),
            reason: format!("minimum {min} exceeds maximum {max}"),
        });
    }
    Ok(StreamTuning {
        jitter_min: Duration::from_millis(min),
        jitter_max: Duration::from_millis(max),
        reconnect_delay: Duration::from_secs(defaults.reconnect_delay_secs),
        retry_interval: Duration::from_millis(defaults.stream_retry_ms),
    })
}

/// Build a `ControllerConfig` from a profile, with no CLI overrides.
///
/// The controller is named after the profile.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let connection = profile_to_connection(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };
    let timeout = Duration::from_secs(profile.timeout_secs.unwrap_or(defaults.timeout_secs));

    Ok(ControllerConfig {
        name: profile_name.to_owned(),
        connection,
        transport: TransportConfig {
            tls,
            timeout,
            ..TransportConfig::default()
        },
        stream: stream_tuning(defaults)?,
        sync_retry: Duration::from_secs(defaults.sync_retry_secs),
    })
}
