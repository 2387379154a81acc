//! Fetch a notebook, execute it, and relay the executed copy.

use std::path::PathBuf;

use bytes::Bytes;
use tracing::info;

use nbgrid_control::ObjectStore;

use crate::error::{NotebookError, NotebookResult};
use crate::execute::NotebookExecutor;
use crate::upload::object_key;

/// Where a notebook comes from and where its executed copy goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Notebook name without the `.ipynb` extension.
    pub notebook_name: String,
    pub bucket: String,
    pub key_prefix: String,
    pub output_bucket: String,
    pub output_key_prefix: String,
    /// Local scratch directory for the input and executed files.
    pub work_dir: PathBuf,
}

impl RunRequest {
    pub fn input_key(&self) -> String {
        object_key(&self.key_prefix, &format!("{}.ipynb", self.notebook_name))
    }

    pub fn output_key(&self) -> String {
        object_key(
            &self.output_key_prefix,
            &format!("{}_executed.ipynb", self.notebook_name),
        )
    }
}

/// Get `{prefix}/{name}.ipynb`, execute it, and put the result at
/// `{output_prefix}/{name}_executed.ipynb`. Returns the output key.
pub async fn run_and_relay(
    store: &dyn ObjectStore,
    executor: &dyn NotebookExecutor,
    request: &RunRequest,
) -> NotebookResult<String> {
    let input_key = request.input_key();
    let notebook = store.get(&request.bucket, &input_key).await?;

    tokio::fs::create_dir_all(&request.work_dir)
        .await
        .map_err(|e| NotebookError::io(&request.work_dir, e))?;
    let input = request
        .work_dir
        .join(format!("{}.ipynb", request.notebook_name));
    let output = request
        .work_dir
        .join(format!("{}_executed.ipynb", request.notebook_name));
    tokio::fs::write(&input, &notebook)
        .await
        .map_err(|e| NotebookError::io(&input, e))?;

    executor.execute(&input, &output).await?;

    let executed = tokio::fs::read(&output)
        .await
        .map_err(|e| NotebookError::io(&output, e))?;
    let output_key = request.output_key();
    store
        .put(&request.output_bucket, &output_key, Bytes::from(executed))
        .await?;
    info!(
        notebook = %request.notebook_name,
        from = %format!("{}/{}", request.bucket, input_key),
        to = %format!("{}/{}", request.output_bucket, output_key),
        "relayed executed notebook"
    );
    Ok(output_key)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;
    use nbgrid_control::{BoxFuture, InMemoryObjectStore, ObjectStoreError};

    /// Appends a marker to the input and records each call.
    #[derive(Default)]
    struct MarkingExecutor {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
        fail: bool,
    }

    impl NotebookExecutor for MarkingExecutor {
        fn execute<'a>(
            &'a self,
            input: &'a Path,
            output: &'a Path,
        ) -> BoxFuture<'a, NotebookResult<()>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((input.to_path_buf(), output.to_path_buf()));
                if self.fail {
                    return Err(NotebookError::ExecutionFailed {
                        program: "fake".to_string(),
                        status: "exit status: 1".to_string(),
                        stderr: "cell 3 raised".to_string(),
                    });
                }
                let mut content = std::fs::read(input).unwrap();
                content.extend_from_slice(b" executed");
                std::fs::write(output, content).unwrap();
                Ok(())
            })
        }
    }

    fn request(work_dir: &Path) -> RunRequest {
        RunRequest {
            notebook_name: "nbgrid-report".to_string(),
            bucket: "in".to_string(),
            key_prefix: "notebooks".to_string(),
            output_bucket: "out".to_string(),
            output_key_prefix: "results/".to_string(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn executed_copy_lands_at_output_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        store
            .put("in", "notebooks/nbgrid-report.ipynb", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let executor = MarkingExecutor::default();

        let key = run_and_relay(&store, &executor, &request(dir.path()))
            .await
            .unwrap();

        assert_eq!(key, "results/nbgrid-report_executed.ipynb");
        assert_eq!(
            store.get("out", &key).await.unwrap(),
            Bytes::from_static(b"{} executed")
        );
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.ends_with("nbgrid-report.ipynb"));
    }

    #[tokio::test]
    async fn missing_input_is_store_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        let executor = MarkingExecutor::default();

        let err = run_and_relay(&store, &executor, &request(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotebookError::Store(ObjectStoreError::NotFound { .. })
        ));
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_execution_uploads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        store
            .put("in", "notebooks/nbgrid-report.ipynb", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let executor = MarkingExecutor {
            fail: true,
            ..MarkingExecutor::default()
        };

        let err = run_and_relay(&store, &executor, &request(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, NotebookError::ExecutionFailed { .. }));
        assert!(store.keys("out").is_empty());
    }
}
