pub mod dispatch;
pub mod provision;
pub mod run;
pub mod upload;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nbgrid_control::{ControlPlane, HttpControlPlane, HttpObjectStore};
use nbgrid_core::RawConfig;
use tracing::info;

/// File (if given) overlaid by the process environment. Fields are resolved
/// by each command so a missing value fails before any remote call it needs.
pub fn load_config(path: Option<&Path>) -> Result<RawConfig> {
    RawConfig::load(path).context("loading configuration")
}

/// Control-plane client for the configured region. Region and endpoint are
/// both required before anything is sent.
pub fn control_plane(raw: &RawConfig) -> Result<Arc<dyn ControlPlane>> {
    let region = raw.region()?;
    let endpoint = raw.control_plane_endpoint()?;
    let client = HttpControlPlane::new(&endpoint)
        .with_context(|| format!("control plane endpoint {endpoint}"))?;
    info!(%region, %endpoint, "using control plane");
    Ok(Arc::new(client))
}

pub fn object_store(raw: &RawConfig) -> Result<HttpObjectStore> {
    let endpoint = raw.object_store_endpoint()?;
    HttpObjectStore::new(&endpoint).with_context(|| format!("object store endpoint {endpoint}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbgrid_core::config::{ENV_CONTROL_PLANE_ENDPOINT, ENV_REGION};

    fn raw(vars: &[(&str, &str)]) -> RawConfig {
        let mut raw = RawConfig::default();
        raw.apply_env(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        raw
    }

    #[test]
    fn control_plane_requires_region() {
        let err = control_plane(&raw(&[(ENV_CONTROL_PLANE_ENDPOINT, "http://127.0.0.1:4566")]))
            .err()
            .unwrap();
        assert!(err.to_string().contains(ENV_REGION), "{err}");
    }

    #[test]
    fn control_plane_requires_endpoint() {
        let err = control_plane(&raw(&[(ENV_REGION, "eu-west-1")])).err().unwrap();
        assert!(err.to_string().contains(ENV_CONTROL_PLANE_ENDPOINT), "{err}");
    }

    #[test]
    fn control_plane_builds_with_region_and_endpoint() {
        assert!(control_plane(&raw(&[
            (ENV_REGION, "eu-west-1"),
            (ENV_CONTROL_PLANE_ENDPOINT, "http://127.0.0.1:4566"),
        ]))
        .is_ok());
    }
}
