//! Notebook discovery and upload.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use nbgrid_control::ObjectStore;

use crate::error::{NotebookError, NotebookResult};

const NOTEBOOK_EXTENSION: &str = "ipynb";

/// One uploaded notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedNotebook {
    pub key: String,
    pub size: usize,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub sha256: String,
}

/// `.ipynb` files directly inside `dir`, sorted by path.
pub fn discover_notebooks(dir: &Path) -> NotebookResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            NotebookError::io(path, e.into())
        })?;
        let is_notebook = entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(NOTEBOOK_EXTENSION);
        if is_notebook {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!(dir = %dir.display(), count = found.len(), "discovered notebooks");
    Ok(found)
}

/// `{prefix}/{name}` without doubled or leading slashes.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// File name and content of every notebook in `dir`. An empty directory is
/// [`NotebookError::NoNotebooks`].
pub async fn read_notebooks(dir: &Path) -> NotebookResult<Vec<(String, Vec<u8>)>> {
    let paths = discover_notebooks(dir)?;
    if paths.is_empty() {
        return Err(NotebookError::NoNotebooks {
            dir: dir.to_path_buf(),
        });
    }

    let mut notebooks = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| NotebookError::io(&path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        notebooks.push((file_name, content));
    }
    Ok(notebooks)
}

/// Put every notebook in `dir` under `{prefix}/{file name}` in `bucket`.
pub async fn upload_notebooks(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    dir: &Path,
) -> NotebookResult<Vec<UploadedNotebook>> {
    let notebooks = read_notebooks(dir).await?;

    let mut uploaded = Vec::with_capacity(notebooks.len());
    for (file_name, content) in notebooks {
        let key = object_key(prefix, &file_name);
        let sha256 = hex::encode(Sha256::digest(&content));
        let size = content.len();

        store.put(bucket, &key, Bytes::from(content)).await?;
        info!(%bucket, %key, size, %sha256, "uploaded notebook");
        uploaded.push(UploadedNotebook { key, size, sha256 });
    }
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbgrid_control::InMemoryObjectStore;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn discovery_is_flat_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.ipynb", "{}");
        write(dir.path(), "a.ipynb", "{}");
        write(dir.path(), "notes.txt", "");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "c.ipynb", "{}");

        let found = discover_notebooks(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.ipynb", "b.ipynb"]);
    }

    #[test]
    fn object_keys() {
        assert_eq!(object_key("notebooks/", "a.ipynb"), "notebooks/a.ipynb");
        assert_eq!(object_key("", "a.ipynb"), "a.ipynb");
        assert_eq!(object_key("/x/y/", "a.ipynb"), "x/y/a.ipynb");
    }

    #[tokio::test]
    async fn uploads_each_notebook_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notebook.ipynb", "{\"cells\":[]}");
        let store = InMemoryObjectStore::new();

        let uploaded = upload_notebooks(&store, "bucket", "nb", dir.path())
            .await
            .unwrap();

        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].key, "nb/notebook.ipynb");
        assert_eq!(uploaded[0].size, 12);
        assert_eq!(uploaded[0].sha256.len(), 64);
        assert_eq!(
            uploaded[0].sha256,
            hex::encode(Sha256::digest(b"{\"cells\":[]}"))
        );
        assert!(store.contains("bucket", "nb/notebook.ipynb"));
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "readme.md", "");
        let store = InMemoryObjectStore::new();

        let err = upload_notebooks(&store, "bucket", "nb", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, NotebookError::NoNotebooks { .. }));
        assert!(store.keys("bucket").is_empty());
    }

    #[tokio::test]
    async fn reads_names_and_content_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "training-b.ipynb", "b");
        write(dir.path(), "monitoring-a.ipynb", "a");

        let notebooks = read_notebooks(dir.path()).await.unwrap();
        assert_eq!(
            notebooks,
            vec![
                ("monitoring-a.ipynb".to_string(), b"a".to_vec()),
                ("training-b.ipynb".to_string(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(matches!(
            discover_notebooks(&missing),
            Err(NotebookError::Io { .. })
        ));
    }
}
