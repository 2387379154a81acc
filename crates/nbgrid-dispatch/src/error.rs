//! Dispatch error types.

use thiserror::Error;

use nbgrid_core::ScriptError;
use nbgrid_lifecycle::LifecycleError;

/// Result type alias for a single job.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Why one job of a batch did not reach `InService`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("workload could not be embedded: {0}")]
    Script(#[from] ScriptError),

    #[error("workload identifier {0:?} yields no usable instance name")]
    InvalidIdentifier(String),

    #[error("instance name {instance_name} for {identifier} is already taken by {first} in this batch")]
    DuplicateInstanceName {
        identifier: String,
        instance_name: String,
        first: String,
    },

    #[error("job {identifier} cancelled before it was submitted")]
    Cancelled { identifier: String },

    #[error("job {identifier} aborted: {reason}")]
    Aborted { identifier: String, reason: String },
}
