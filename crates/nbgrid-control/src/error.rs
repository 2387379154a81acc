//! Control-plane and object-store error types.

use thiserror::Error;

/// Result type alias for control-plane calls.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Result type alias for object-store calls.
pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// A control-plane call that did not succeed.
///
/// Expected signals (not found, already exists) never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    #[error("{operation} rejected by control plane: {code}: {message}")]
    Rejected {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("control plane transport error: {0}")]
    Transport(String),

    #[error("invalid control plane endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unexpected control plane response: {0}")]
    UnexpectedResponse(String),
}

/// An object-store call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("object store rejected {operation} of {bucket}/{key}: HTTP {status}")]
    Rejected {
        operation: &'static str,
        bucket: String,
        key: String,
        status: u16,
    },

    #[error("object store transport error: {0}")]
    Transport(String),

    #[error("invalid object store endpoint: {0}")]
    InvalidEndpoint(String),
}
