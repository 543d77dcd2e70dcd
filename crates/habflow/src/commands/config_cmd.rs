//! Config subcommand handlers.

use dialoguer::{Confirm, Input};

use habflow_api::ServerVersion;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
        if profile.token.is_some() {
            profile.token = Some(MASK.into());
        }
    }
    cfg
}

/// Format config for display. Expects an already redacted config.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let d = &cfg.defaults;
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", d.output);
    let _ = writeln!(out, "timeout_secs = {}", d.timeout_secs);
    let _ = writeln!(
        out,
        "startup_jitter_ms = [{}, {}]",
        d.startup_jitter_ms[0], d.startup_jitter_ms[1]
    );
    let _ = writeln!(out, "reconnect_delay_secs = {}", d.reconnect_delay_secs);
    let _ = writeln!(out, "stream_retry_ms = {}", d.stream_retry_ms);
    let _ = writeln!(out, "sync_retry_secs = {}", d.sync_retry_secs);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        if !p.protocol.is_empty() {
            let _ = writeln!(out, "protocol = \"{}\"", p.protocol);
        }
        let _ = writeln!(out, "host = \"{}\"", p.host);
        if let Some(port) = p.port {
            let _ = writeln!(out, "port = {port}");
        }
        if !p.path.is_empty() {
            let _ = writeln!(out, "path = \"{}\"", p.path);
        }
        let version = match p.version {
            ServerVersion::V2 => "v2",
            ServerVersion::V3 => "v3",
        };
        let _ = writeln!(out, "version = \"{version}\"");
        if let Some(ref u) = p.username {
            let _ = writeln!(out, "username = \"{u}\"");
        }
        if let Some(ref pw) = p.password {
            let _ = writeln!(out, "password = \"{pw}\"");
        }
        if let Some(ref token) = p.token {
            let _ = writeln!(out, "token = \"{token}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout_secs {
            let _ = writeln!(out, "timeout_secs = {timeout}");
        }
    }

    out.trim_end().to_owned()
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_version(raw: &str) -> Result<ServerVersion, CliError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "v2" | "2" => Ok(ServerVersion::V2),
        "v3" | "3" | "v4" | "4" => Ok(ServerVersion::V3),
        other => Err(CliError::Validation {
            field: "server-version".into(),
            reason: format!("expected 'v2' or 'v3', got '{other}'"),
        }),
    }
}

fn prompt_token() -> Result<String, CliError> {
    let token = rpassword::prompt_password("API token: ").map_err(prompt_err)?;
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init) => handle_init(&init, global),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = output::render_single(global.output, &cfg, format_config, |c| {
                c.default_profile.clone().unwrap_or_default()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));

            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: config::available_profiles(&cfg),
                });
            }

            let token = prompt_token()?;
            config::store_token(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

fn handle_init(init: &InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path();
    let mut cfg = config::load_config_or_default();
    let profile_name = global.profile.clone().unwrap_or_else(|| "default".into());
    let version = parse_version(&init.server_version)?;

    let interactive = global.host.is_none();
    let (host, port) = if let Some(ref host) = global.host {
        (host.clone(), global.port)
    } else {
        eprintln!("✨ habflow — configuration wizard");
        eprintln!("   Config path: {}\n", config_path.display());

        let host: String = Input::new()
            .with_prompt("openHAB host")
            .default("localhost".into())
            .interact_text()
            .map_err(prompt_err)?;
        let port: u16 = Input::new()
            .with_prompt("Port")
            .default(global.port.unwrap_or(8080))
            .interact_text()
            .map_err(prompt_err)?;
        (host, Some(port))
    };

    let profile = Profile {
        protocol: init.protocol.clone(),
        host,
        port,
        version,
        ..Profile::default()
    };
    // Validate before touching the file.
    habflow_config::profile_to_connection(&profile, &profile_name)?;

    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }
    let path = config::save_config(&cfg)?;

    if interactive {
        let wants_token = Confirm::new()
            .with_prompt("Store an API token in the system keyring now?")
            .default(false)
            .interact()
            .map_err(prompt_err)?;
        if wants_token {
            config::store_token(&profile_name, &prompt_token()?)?;
            eprintln!("   ✓ Token stored in system keyring");
        }
    }

    if !global.quiet {
        eprintln!("✓ Profile '{profile_name}' written to {}", path.display());
        eprintln!("  Test it: habflow items --profile {profile_name}");
    }
    Ok(())
}
