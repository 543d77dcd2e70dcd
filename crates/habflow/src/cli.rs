//! Clap derive structures for the `habflow` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// habflow -- talk to an openHAB server from the command line
#[derive(Debug, Parser)]
#[command(
    name = "habflow",
    version,
    about = "Read, drive and watch openHAB items from the command line",
    long_about = "A CLI for openHAB servers.\n\n\
        Lists and controls items over the REST API and follows the\n\
        server-sent event stream with reconnects and initial-state sync.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "HABFLOW_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server host name or address (overrides profile)
    #[arg(long, short = 'H', env = "HABFLOW_HOST", global = true)]
    pub host: Option<String>,

    /// Server port (overrides profile)
    #[arg(long, env = "HABFLOW_PORT", global = true)]
    pub port: Option<u16>,

    /// API token
    #[arg(long, env = "HABFLOW_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HABFLOW_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HABFLOW_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HABFLOW_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List items and their states
    #[command(alias = "ls")]
    Items(ItemsArgs),

    /// Show one item
    Get {
        /// Item name
        item: String,
    },

    /// Send a command to an item (POST)
    #[command(alias = "cmd")]
    Send {
        /// Item name
        item: String,
        /// Command, e.g. ON, OFF, 42
        command: String,
        /// Skip the write when the item already has this state
        #[arg(long)]
        if_changed: bool,
    },

    /// Post a state update to an item (PUT)
    Update {
        /// Item name
        item: String,
        /// New state
        state: String,
        /// Skip the write when the item already has this state
        #[arg(long)]
        if_changed: bool,
    },

    /// Run a controller and print item messages until Ctrl-C
    Watch(WatchArgs),

    /// Print every server event until Ctrl-C
    Events,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Items ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ItemsArgs {
    /// Only items whose name contains this text (case-insensitive)
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Only items of this type, e.g. Switch, Number, Group
    #[arg(long, short = 't')]
    pub item_type: Option<String>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Item to follow (repeatable). Without it, every item event is printed.
    #[arg(long, short = 'i')]
    pub item: Vec<String>,

    /// Emit state updates
    #[arg(long)]
    pub updates: bool,

    /// Emit state changes (default when no kind is chosen)
    #[arg(long)]
    pub changes: bool,

    /// Emit commands
    #[arg(long)]
    pub commands: bool,

    /// Only changes away from this state
    #[arg(long)]
    pub changed_from: Option<String>,

    /// Only changes into this state
    #[arg(long)]
    pub changed_to: Option<String>,

    /// Ignore group state changes
    #[arg(long)]
    pub no_group_changes: bool,

    /// Print each item's state once the connection is up
    #[arg(long)]
    pub initial: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend a profile (prompts when --host is omitted)
    Init(InitArgs),

    /// Display current configuration with secrets masked
    Show,

    /// Print the config file path
    Path,

    /// Store an API token in the system keyring
    SetToken {
        /// Profile to store the token for (defaults to the active profile)
        #[arg(long = "for")]
        profile: Option<String>,
    },
}

/// Profile name, host and port come from the global `--profile`,
/// `--host` and `--port` flags.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// http or https
    #[arg(long, default_value = "http")]
    pub protocol: String,

    /// Server generation: v2 or v3
    #[arg(long, default_value = "v3")]
    pub server_version: String,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
