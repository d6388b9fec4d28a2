// ── Core error types ──
//
// Every fallible operation in topowatch-core returns `CoreError`.
// Collaborators (discovery, persistence) report failures through the
// `Discovery` / `Persistence` variants so the monitor can roll back
// without caring which backend produced them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Contention ───────────────────────────────────────────────────
    #[error("Monitor is starting, please wait")]
    MonitorStarting,

    #[error("Monitor is stopping, please try again later")]
    MonitorStopping,

    #[error("Failed to start monitor, please try again later")]
    MonitorBusy,

    #[error("Monitor is stopping, please wait")]
    StopInProgress,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid project id: {project_id}")]
    InvalidProjectId { project_id: i64 },

    #[error("Another project is in monitor state, projectId: {project_id}")]
    AnotherProjectMonitoring { project_id: i64 },

    #[error("Monitor is not running for project {project_id}")]
    NotRunning { project_id: i64 },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Dependency failures ──────────────────────────────────────────
    #[error("Discovery subsystem error: {message}")]
    Discovery { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Faults ───────────────────────────────────────────────────────
    #[error("Monitor setup panicked: {message}")]
    SetupPanicked { message: String },

    #[error("Task not found: {name}")]
    TaskNotFound { name: String },

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity_type: &str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_owned(),
            identifier: identifier.to_string(),
        }
    }

    /// Contention errors are transient: the caller may retry the same call.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::MonitorStarting | Self::MonitorStopping | Self::MonitorBusy | Self::StopInProgress
        )
    }
}

/// Convert a caught panic payload into a readable message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn another_project_error_names_the_project() {
        let err = CoreError::AnotherProjectMonitoring { project_id: 7 };
        assert_eq!(
            err.to_string(),
            "Another project is in monitor state, projectId: 7"
        );
    }

    #[test]
    fn contention_errors_are_flagged() {
        assert!(CoreError::MonitorStarting.is_contention());
        assert!(CoreError::StopInProgress.is_contention());
        assert!(!CoreError::PoolClosed.is_contention());
        assert!(!CoreError::InvalidProjectId { project_id: 0 }.is_contention());
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }
}
