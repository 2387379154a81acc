use std::path::Path;

use anyhow::Result;

pub async fn upload(config: Option<&Path>, dir: &Path) -> Result<()> {
    let raw = super::load_config(config)?;
    let store_settings = raw.store_settings()?;
    let store = super::object_store(&raw)?;

    let uploaded = nbgrid_notebook::upload_notebooks(
        &store,
        &store_settings.bucket,
        &store_settings.key_prefix,
        dir,
    )
    .await?;

    for notebook in &uploaded {
        println!(
            "✓ Uploaded s3://{}/{} ({} bytes)",
            store_settings.bucket, notebook.key, notebook.size
        );
        println!("  SHA256: {}", notebook.sha256);
    }
    Ok(())
}
