//! Clap derive structures for the `ptzlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ptzlink -- remote pan/tilt/zoom control from the command line
#[derive(Debug, Parser)]
#[command(
    name = "ptzlink",
    version,
    about = "Drive PTZ cameras over their WebSocket control channel",
    long_about = "Remote pan/tilt/zoom control for network cameras.\n\n\
        Opens an authenticated control channel per device, sends motion,\n\
        preset and patrol commands, and reports device position.",
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
    /// Endpoint profile to use
    #[arg(long, short = 'p', env = "PTZLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Control endpoint URL (overrides profile)
    #[arg(long, short = 'e', env = "PTZLINK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Bearer token for the control channel
    #[arg(long, env = "PTZLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// User id announced when connecting
    #[arg(long, env = "PTZLINK_USER_ID", global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PTZLINK_OUTPUT",
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

    /// Handshake timeout in seconds (overrides profile)
    #[arg(long, env = "PTZLINK_TIMEOUT", global = true)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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
    /// Query a device's current pan/tilt/zoom position
    #[command(alias = "st")]
    Status(DeviceArgs),

    /// Pan/tilt like a joystick held at (x, y), then release
    #[command(alias = "mv")]
    Move(MoveArgs),

    /// Zoom at a level in [0, 100] (50 = no zoom), then release
    Zoom(ZoomArgs),

    /// Stop all motion
    Stop(DeviceArgs),

    /// Move to a stored preset position
    Preset(PresetArgs),

    /// Control preset patrol
    Patrol(PatrolArgs),

    /// Print session state changes and status pushes until interrupted
    Watch(WatchArgs),

    /// Line-driven control console reading commands from stdin
    #[command(alias = "js")]
    Joystick(DeviceArgs),

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONTROL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device identifier
    pub device: String,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    /// Device identifier
    pub device: String,

    /// Horizontal deflection in [-1, 1] (right is positive)
    #[arg(long, allow_negative_numbers = true)]
    pub x: f64,

    /// Vertical deflection in [-1, 1] (up is positive)
    #[arg(long, allow_negative_numbers = true)]
    pub y: f64,

    /// Deflection strength in [0, 1]
    #[arg(long, short = 'm', default_value = "1.0")]
    pub magnitude: f64,

    /// How long to hold the gesture (e.g. "800ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub hold: Duration,
}

#[derive(Debug, Args)]
pub struct ZoomArgs {
    /// Device identifier
    pub device: String,

    /// Zoom level in [0, 100]; below 50 zooms out, above zooms in
    pub level: f64,

    /// How long to keep zooming
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub hold: Duration,
}

#[derive(Debug, Args)]
pub struct PresetArgs {
    /// Device identifier
    pub device: String,

    /// Stored preset identifier
    pub preset: String,
}

#[derive(Debug, Args)]
pub struct PatrolArgs {
    /// Device identifier
    pub device: String,

    /// Patrol action
    pub action: PatrolVerb,

    /// Patrol pattern (only used by `start`)
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PatrolVerb {
    Start,
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device identifier
    pub device: String,

    /// Stop watching after this long instead of waiting for Ctrl-C
    #[arg(long = "for", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Request the device's status once connected
    #[arg(long)]
    pub status: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g. "endpoint", "throttle_ms", "reconnect_attempts")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
