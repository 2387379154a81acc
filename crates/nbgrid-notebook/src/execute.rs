//! Notebook execution engines.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use nbgrid_control::BoxFuture;

use crate::error::{NotebookError, NotebookResult};

/// Runs a notebook at `input` and writes the executed copy to `output`.
pub trait NotebookExecutor: Send + Sync {
    fn execute<'a>(&'a self, input: &'a Path, output: &'a Path) -> BoxFuture<'a, NotebookResult<()>>;
}

/// Executes notebooks with the `papermill` command-line tool.
#[derive(Debug, Clone)]
pub struct PapermillExecutor {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for PapermillExecutor {
    fn default() -> Self {
        Self::with_program("papermill")
    }
}

impl PapermillExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable with papermill's `<input> <output>` calling convention.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments appended after the input and output paths,
    /// e.g. `-p alpha 0.6` or `--kernel python3`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    async fn run(&self, input: &Path, output: &Path) -> NotebookResult<()> {
        let program = self.program.display().to_string();
        debug!(%program, input = %input.display(), output = %output.display(), "executing notebook");

        let result = Command::new(&self.program)
            .arg(input)
            .arg(output)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| NotebookError::io(&self.program, e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(NotebookError::ExecutionFailed {
                program,
                status: result.status.to_string(),
                stderr,
            });
        }
        info!(input = %input.display(), output = %output.display(), "notebook executed");
        Ok(())
    }
}

impl NotebookExecutor for PapermillExecutor {
    fn execute<'a>(&'a self, input: &'a Path, output: &'a Path) -> BoxFuture<'a, NotebookResult<()>> {
        Box::pin(self.run(input, output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_program_with_input_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ipynb");
        let output = dir.path().join("out.ipynb");
        std::fs::write(&input, "{\"cells\":[]}").unwrap();

        // `cp <input> <output>` shares papermill's argument order.
        PapermillExecutor::with_program("cp")
            .execute(&input, &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "{\"cells\":[]}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = PapermillExecutor::with_program("false")
            .execute(&dir.path().join("a"), &dir.path().join("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotebookError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PapermillExecutor::with_program("nbgrid-no-such-program")
            .execute(&dir.path().join("a"), &dir.path().join("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotebookError::Io { .. }));
    }
}
