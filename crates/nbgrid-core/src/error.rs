//! Configuration and script error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while assembling configuration or validating descriptors.
///
/// All of these are detected before any remote call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration `{field}` (set {var})")]
    MissingEnv {
        field: &'static str,
        var: &'static str,
    },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Name of the configuration field this error is about, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::MissingEnv { field, .. }
            | ConfigError::MissingField(field)
            | ConfigError::Invalid { field, .. } => Some(field),
            ConfigError::Read { .. } | ConfigError::Parse(_) => None,
        }
    }
}

/// Errors building or decoding a provisioning script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("script is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to compress workload: {0}")]
    Compress(#[from] std::io::Error),
}
