//! Clap derive structures for the `intellicenter` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// intellicenter -- command-line client for Pentair IntelliCenter
#[derive(Debug, Parser)]
#[command(
    name = "intellicenter",
    version,
    about = "Monitor and control Pentair IntelliCenter pool controllers",
    long_about = "Talks to an IntelliCenter controller over its local TCP protocol (port 6681).\n\n\
        Lists equipment, streams live updates and changes setpoints, circuits,\n\
        chemistry and valves.",
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
    /// Controller profile to use
    #[arg(long, short = 'p', env = "INTELLICENTER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller host (overrides profile)
    #[arg(long, short = 'H', env = "INTELLICENTER_HOST", global = true)]
    pub host: Option<String>,

    /// Controller TCP port (overrides profile)
    #[arg(long, env = "INTELLICENTER_PORT", global = true)]
    pub port: Option<u16>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "INTELLICENTER_OUTPUT",
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

    /// Request timeout in seconds
    #[arg(long, env = "INTELLICENTER_TIMEOUT", global = true)]
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

/// `on` / `off` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show controller identity and connection statistics
    Info,

    /// Browse the controller's objects
    #[command(alias = "obj", alias = "o")]
    Objects(ObjectsArgs),

    /// Stream live model changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Write raw attributes of one object
    Set(SetArgs),

    /// Turn a circuit, body or pump on
    On {
        /// Object name (e.g. C0003)
        objnam: String,
    },

    /// Turn a circuit, body or pump off
    Off {
        /// Object name (e.g. C0003)
        objnam: String,
    },

    /// Set a body's heating setpoint
    #[command(alias = "sp")]
    Setpoint(SetpointArgs),

    /// Select or clear a body's heater
    Heater(HeaterArgs),

    /// Chemistry and chlorinator settings
    Chem(ChemArgs),

    /// Light effects
    Light(LightArgs),

    /// Open or close a valve
    Valve {
        /// Valve object name
        valve: String,
        state: Switch,
    },

    /// Turn vacation mode on or off
    Vacation { state: Switch },

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OBJECTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ObjectsArgs {
    #[command(subcommand)]
    pub command: ObjectsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ObjectsCommand {
    /// List objects
    #[command(alias = "ls")]
    List {
        /// Only objects of this type (BODY, CIRCUIT, PUMP, ...)
        #[arg(long, short = 't')]
        r#type: Option<String>,

        /// Only objects of this subtype
        #[arg(long, short = 's')]
        subtype: Option<String>,
    },

    /// Show every attribute of one object
    Get {
        /// Object name
        objnam: String,
    },

    /// List objects nested under another object
    Children {
        /// Parent object name
        objnam: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report changes to these objects
    #[arg(long = "object", short = 'O')]
    pub objects: Vec<String>,

    /// Keep reconnecting after the connection drops
    #[arg(long, short = 'r')]
    pub reconnect: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SETTERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Object name
    pub objnam: String,

    /// Attribute assignments, e.g. STATUS=ON SNAME="Spa Light"
    #[arg(required = true, value_parser = parse_assignment)]
    pub changes: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct SetpointArgs {
    /// Body object name (e.g. B1101)
    pub body: String,

    /// Temperature in the controller's units
    #[arg(allow_negative_numbers = true)]
    pub temperature: i32,

    /// Set the cooling / maximum setpoint (HITMP) instead
    #[arg(long)]
    pub max: bool,
}

#[derive(Debug, Args)]
pub struct HeaterArgs {
    /// Body object name
    pub body: String,

    /// Heater object name; omit with --clear
    #[arg(required_unless_present = "clear", conflicts_with = "clear")]
    pub heater: Option<String>,

    /// Remove the heater assignment
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct ChemArgs {
    #[command(subcommand)]
    pub command: ChemCommand,
}

#[derive(Debug, Subcommand)]
pub enum ChemCommand {
    /// pH setpoint (7.0 - 7.6)
    Ph { chem: String, value: f64 },

    /// ORP setpoint in millivolts (400 - 800)
    Orp { chem: String, millivolts: u32 },

    /// Chlorinator output percentages (0 - 100)
    Chlorinator {
        chem: String,
        primary: u8,
        secondary: Option<u8>,
    },

    /// Total alkalinity in ppm (0 - 800)
    Alkalinity { chem: String, ppm: u32 },

    /// Calcium hardness in ppm (0 - 800)
    Calcium { chem: String, ppm: u32 },

    /// Cyanuric acid in ppm (0 - 201)
    Cyanuric { chem: String, ppm: u32 },
}

#[derive(Debug, Args)]
pub struct LightArgs {
    #[command(subcommand)]
    pub command: LightCommand,
}

#[derive(Debug, Subcommand)]
pub enum LightCommand {
    /// Start a light effect
    Effect {
        /// Light circuit object name
        circuit: String,
        /// Effect code (see `light effects`)
        effect: String,
    },

    /// List known effect codes
    Effects,
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
    /// Create or extend the config file with a profile
    Init {
        /// Controller host name or IP address
        #[arg(long)]
        host: String,

        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Controller TCP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (host, port, timeout, keepalive_interval, ...)
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

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ───────────────────────────────────────────────────

/// Parse `KEY=VALUE`. Keys are upper-cased to match the wire vocabulary.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing attribute name in '{raw}'"));
    }
    Ok((key.to_ascii_uppercase(), value.to_owned()))
}
