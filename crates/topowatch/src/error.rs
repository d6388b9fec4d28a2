//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use topowatch_config::ConfigError;
use topowatch_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const DEPENDENCY: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Lifecycle contention ─────────────────────────────────────────

    #[error("Monitor is busy: {message}")]
    #[diagnostic(
        code(topowatch::busy),
        help("Another start, stop or reload is in progress. Retry shortly.")
    )]
    Busy { message: String },

    #[error("Project {project_id} is already being monitored")]
    #[diagnostic(
        code(topowatch::another_project),
        help("Only one project is monitored at a time. Stop project {project_id} first.")
    )]
    AnotherProject { project_id: i64 },

    #[error("Project {project_id} is not being monitored")]
    #[diagnostic(code(topowatch::not_running))]
    NotRunning { project_id: i64 },

    // ── Collaborators ────────────────────────────────────────────────

    #[error("Discovery failed: {message}")]
    #[diagnostic(
        code(topowatch::discovery),
        help("Check the fixture's Devices and Links sections.")
    )]
    Discovery { message: String },

    #[error("Persistence failed: {message}")]
    #[diagnostic(code(topowatch::persistence))]
    Persistence { message: String },

    #[error("{entity_type} '{identifier}' not found")]
    #[diagnostic(
        code(topowatch::not_found),
        help("Pass --project with the id of the fixture's project.")
    )]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(topowatch::validation))]
    Validation { field: String, reason: String },

    #[error("Could not parse {path}")]
    #[diagnostic(
        code(topowatch::input),
        help("See `topowatch run --help` and `topowatch diff --help` for the expected JSON shapes.")
    )]
    InputFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(topowatch::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(topowatch::config),
        help("Check the config file and TOPOWATCH_* environment variables.")
    )]
    Config(ConfigError),

    // ── Internal ─────────────────────────────────────────────────────

    #[error("Internal error: {message}")]
    #[diagnostic(code(topowatch::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(topowatch::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(topowatch::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Could not render TOML: {0}")]
    #[diagnostic(code(topowatch::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Busy { .. } | Self::AnotherProject { .. } | Self::ConfigExists { .. } => {
                exit_code::CONFLICT
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Discovery { .. } | Self::Persistence { .. } => exit_code::DEPENDENCY,
            Self::Validation { .. } | Self::InputFile { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MonitorStarting
            | CoreError::MonitorStopping
            | CoreError::MonitorBusy
            | CoreError::StopInProgress => CliError::Busy {
                message: err.to_string(),
            },

            CoreError::AnotherProjectMonitoring { project_id } => {
                CliError::AnotherProject { project_id }
            }

            CoreError::NotRunning { project_id } => CliError::NotRunning { project_id },

            CoreError::InvalidProjectId { project_id } => CliError::Validation {
                field: "project".into(),
                reason: format!("project id must be positive, got {project_id}"),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Discovery { message } => CliError::Discovery { message },

            CoreError::Persistence { message } => CliError::Persistence { message },

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                entity_type,
                identifier,
            },

            CoreError::SetupPanicked { .. }
            | CoreError::TaskNotFound { .. }
            | CoreError::PoolClosed
            | CoreError::Cancelled => CliError::Internal {
                message: err.to_string(),
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}
