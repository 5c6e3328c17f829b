//! Clap derive structures for the `multitek` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// multitek -- control a Multitek smart-home tablet from the command line
#[derive(Debug, Parser)]
#[command(
    name = "multitek",
    version,
    about = "Control Multitek smart-home tablet relays from the command line",
    long_about = "Talks to the tablet's local HTTP API to list and switch lights,\n\
        shutters, switches and valves, and to watch their state live.",
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
    /// Tablet profile to use
    #[arg(long, short = 'p', env = "MULTITEK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Tablet hostname or IP (overrides profile)
    #[arg(long, short = 'H', env = "MULTITEK_HOST", global = true)]
    pub host: Option<String>,

    /// Tablet API port (overrides profile)
    #[arg(long, env = "MULTITEK_PORT", global = true)]
    pub port: Option<u16>,

    /// Tablet API key
    #[arg(long, env = "MULTITEK_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MULTITEK_OUTPUT",
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

    /// Talk to the tablet over HTTPS
    #[arg(long, env = "MULTITEK_HTTPS", global = true)]
    pub https: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "MULTITEK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "MULTITEK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// Probe the tablet and show its identity
    Status,

    /// List and switch relays
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Poll continuously and print changes until Ctrl-C
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List every relay the tablet reports
    #[command(alias = "ls")]
    List,

    /// Show one relay in detail
    Get {
        /// Device ID
        id: String,
    },

    /// Switch a relay on (opens a shutter)
    On {
        /// Device ID
        id: String,
    },

    /// Switch a relay off (closes a shutter)
    Off {
        /// Device ID
        id: String,
    },

    /// Flip a relay
    Toggle {
        /// Device ID
        id: String,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in seconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the configuration with secrets redacted
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's API key in the system keyring (read from stdin)
    SetKey,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
