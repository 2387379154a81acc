//! Notebook error types.

use std::path::PathBuf;

use thiserror::Error;

use nbgrid_control::ObjectStoreError;

/// Result type alias for notebook operations.
pub type NotebookResult<T> = Result<T, NotebookError>;

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("no .ipynb files found in {}", .dir.display())]
    NoNotebooks { dir: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] ObjectStoreError),

    #[error("{program} exited with {status}: {stderr}")]
    ExecutionFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

impl NotebookError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
