//! Lifecycle error types.

use std::fmt;

use thiserror::Error;

use nbgrid_control::ControlPlaneError;
use nbgrid_core::{ConfigError, ResourceState};

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors returned by the orchestrator and the lifecycle-config manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A remote call was rejected or could not be made. Passed through unmodified.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("lifecycle config {name}: encoded script is {len} characters, limit is {limit}")]
    ScriptTooLarge {
        name: String,
        len: usize,
        limit: usize,
    },
}

/// Why a wait ended without reaching its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCause {
    TimedOut,
    Cancelled,
    /// The resource entered `Failed`.
    Failed,
    /// The resource disappeared while being waited on.
    Vanished,
}

impl fmt::Display for WaitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitCause::TimedOut => "timed out",
            WaitCause::Cancelled => "cancelled",
            WaitCause::Failed => "resource failed",
            WaitCause::Vanished => "resource vanished",
        })
    }
}

/// Diagnostic for a wait that did not reach its target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "waiting for {name} to reach {target}: {cause} (last state {last_state}){}",
    reason_suffix(.failure_reason)
)]
pub struct WaitError {
    pub name: String,
    pub target: ResourceState,
    pub cause: WaitCause,
    pub last_state: ResourceState,
    pub failure_reason: Option<String>,
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_error_message_carries_diagnostics() {
        let err = WaitError {
            name: "nb".to_string(),
            target: ResourceState::InService,
            cause: WaitCause::Failed,
            last_state: ResourceState::Failed,
            failure_reason: Some("capacity unavailable".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "waiting for nb to reach InService: resource failed (last state Failed): capacity unavailable"
        );
    }

    #[test]
    fn wait_error_without_reason() {
        let err = WaitError {
            name: "nb".to_string(),
            target: ResourceState::Stopped,
            cause: WaitCause::TimedOut,
            last_state: ResourceState::Stopping,
            failure_reason: None,
        };
        assert!(err.to_string().ends_with("timed out (last state Stopping)"));
    }
}
