//! Clap derive structures for the `topowatch` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// topowatch -- keep an industrial Ethernet topology honest against its baseline
#[derive(Debug, Parser)]
#[command(
    name = "topowatch",
    version,
    about = "Monitor industrial Ethernet topologies against their baseline",
    long_about = "Runs the topology monitor against a discovery source, reconciling the\n\
        project's current devices and links with what is observed on the wire,\n\
        and streams the resulting client notifications as JSON lines.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "TOPOWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
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

    /// Log line format on stderr (overrides [logging] format)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monitor a project backed by a fixture topology
    Run(RunArgs),

    /// Classify observed links against baseline links
    Diff(DiffArgs),

    /// Inspect or create the configuration file
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON fixture holding the project baseline and the observed topology
    #[arg(long, short = 'f')]
    pub fixture: PathBuf,

    /// Project id to monitor (defaults to the fixture project's id)
    #[arg(long, short = 'p')]
    pub project: Option<i64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,
}

// ── Diff ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// JSON array of baseline links: [{"a": "ip:port", "b": "ip:port"}]
    pub baseline: PathBuf,

    /// JSON array of observed links, same shape
    pub actual: PathBuf,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,

    /// Write the default configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
