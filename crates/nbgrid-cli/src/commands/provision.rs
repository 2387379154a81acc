//! `nbgrid lifecycle-config`, `nbgrid ensure`, `nbgrid deploy`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use nbgrid_control::{ControlPlane, CreateConfigResult};
use nbgrid_core::script::DEFAULT_LOCAL_PATH;
use nbgrid_core::{ProvisioningScript, RawConfig, StoreSettings};
use nbgrid_lifecycle::{InServicePolicy, LifecycleConfigManager, Orchestrator};

pub async fn lifecycle_config(config: Option<&Path>) -> Result<()> {
    let raw = super::load_config(config)?;
    let name = raw.lifecycle_config_name()?;
    let store = raw.store_settings()?;
    let client = super::control_plane(&raw)?;

    create_lifecycle_config(&name, &store, client).await
}

pub async fn ensure(config: Option<&Path>, restart: bool, cancel: watch::Receiver<bool>) -> Result<()> {
    let raw = super::load_config(config)?;
    ensure_instance(&raw, restart, cancel).await
}

/// Upload notebooks, create the lifecycle config, and bring the instance up.
///
/// Every required field is resolved before the first remote call.
pub async fn deploy(
    config: Option<&Path>,
    dir: &Path,
    restart: bool,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let raw = super::load_config(config)?;
    let resolved = raw.clone().resolve()?;
    let store = super::object_store(&raw)?;
    let client = super::control_plane(&raw)?;

    let uploaded = nbgrid_notebook::upload_notebooks(
        &store,
        &resolved.store.bucket,
        &resolved.store.key_prefix,
        dir,
    )
    .await?;
    println!(
        "✓ Uploaded {} notebook(s) to s3://{}/{}",
        uploaded.len(),
        resolved.store.bucket,
        resolved.store.key_prefix
    );
    println!("  Deploying {} in {}", resolved.instance.name, resolved.region);

    create_lifecycle_config(&resolved.instance.lifecycle_config_name, &resolved.store, client).await?;
    ensure_instance(&raw, restart, cancel).await
}

pub(crate) async fn ensure_instance(
    raw: &RawConfig,
    restart: bool,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let instance = raw.instance_settings()?;
    let wait = raw.wait_settings()?;
    let client = super::control_plane(raw)?;

    let policy = if restart {
        InServicePolicy::Restart
    } else {
        InServicePolicy::Reuse
    };
    let state = Orchestrator::new(client)
        .with_wait_settings(wait)
        .with_in_service_policy(policy)
        .ensure_running(&instance.descriptor(), cancel)
        .await
        .with_context(|| format!("ensuring notebook instance {}", instance.name))?;

    println!("✓ Notebook instance {} is {state}", instance.name);
    println!("  Type: {}", instance.profile.instance_type);
    println!("  Region: {}", raw.region()?);
    Ok(())
}

async fn create_lifecycle_config(
    name: &str,
    store: &StoreSettings,
    client: Arc<dyn ControlPlane>,
) -> Result<()> {
    let script = ProvisioningScript::sync_from_store(&store.bucket, &store.key_prefix, DEFAULT_LOCAL_PATH);
    let result = LifecycleConfigManager::new(client)
        .ensure(name, &script)
        .await
        .with_context(|| format!("creating lifecycle config {name}"))?;

    match result {
        CreateConfigResult::Created => println!("✓ Created lifecycle config {name}"),
        CreateConfigResult::AlreadyExists => {
            println!("✓ Lifecycle config {name} already exists (left unchanged)")
        }
    }
    println!("  Syncs s3://{}/{} to {DEFAULT_LOCAL_PATH}", store.bucket, store.key_prefix);
    Ok(())
}
