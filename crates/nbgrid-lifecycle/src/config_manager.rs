//! Idempotent creation of lifecycle configs (on-start provisioning scripts).

use std::sync::Arc;

use tracing::info;

use nbgrid_control::{ControlPlane, CreateConfigResult};
use nbgrid_core::script::MAX_ENCODED_SCRIPT_LEN;
use nbgrid_core::{ConfigError, ProvisioningScript};

use crate::error::{LifecycleError, LifecycleResult};

/// Guarantees that a named lifecycle config exists.
pub struct LifecycleConfigManager {
    client: Arc<dyn ControlPlane>,
}

impl LifecycleConfigManager {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }

    /// Create `name` with `script` unless it already exists.
    ///
    /// An existing config is left untouched, even if its content differs.
    pub async fn ensure(
        &self,
        name: &str,
        script: &ProvisioningScript,
    ) -> LifecycleResult<CreateConfigResult> {
        if name.trim().is_empty() {
            return Err(ConfigError::MissingField("lifecycle_config_name").into());
        }

        let encoded = script.encode();
        if encoded.len() > MAX_ENCODED_SCRIPT_LEN {
            return Err(LifecycleError::ScriptTooLarge {
                name: name.to_string(),
                len: encoded.len(),
                limit: MAX_ENCODED_SCRIPT_LEN,
            });
        }

        let result = self.client.create_lifecycle_config(name, &encoded).await?;
        match result {
            CreateConfigResult::Created => info!(%name, bytes = encoded.len(), "lifecycle config created"),
            CreateConfigResult::AlreadyExists => info!(%name, "lifecycle config already exists"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbgrid_control::{ControlPlaneError, InMemoryControlPlane, Operation};
    use nbgrid_core::script::DEFAULT_LOCAL_PATH;

    fn manager(plane: &InMemoryControlPlane) -> LifecycleConfigManager {
        LifecycleConfigManager::new(Arc::new(plane.clone()))
    }

    #[tokio::test]
    async fn ensure_twice_is_success() {
        let plane = InMemoryControlPlane::new();
        let script = ProvisioningScript::sync_from_store("bucket", "nb", DEFAULT_LOCAL_PATH);
        let mgr = manager(&plane);

        assert_eq!(mgr.ensure("lc", &script).await.unwrap(), CreateConfigResult::Created);
        assert_eq!(
            mgr.ensure("lc", &script).await.unwrap(),
            CreateConfigResult::AlreadyExists
        );
        assert_eq!(plane.lifecycle_config("lc"), Some(script.encode()));
    }

    #[tokio::test]
    async fn existing_config_is_not_overwritten() {
        let plane = InMemoryControlPlane::new();
        let mgr = manager(&plane);
        let first = ProvisioningScript::new("#!/bin/bash\necho one\n");
        let second = ProvisioningScript::new("#!/bin/bash\necho two\n");

        mgr.ensure("lc", &first).await.unwrap();
        mgr.ensure("lc", &second).await.unwrap();
        assert_eq!(plane.lifecycle_config("lc"), Some(first.encode()));
    }

    #[tokio::test]
    async fn empty_name_makes_no_call() {
        let plane = InMemoryControlPlane::new();
        let err = manager(&plane)
            .ensure(" ", &ProvisioningScript::new("#!/bin/bash\n"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Config(ConfigError::MissingField("lifecycle_config_name"))
        ));
        assert_eq!(plane.calls().total(), 0);
    }

    #[tokio::test]
    async fn oversized_script_is_rejected_locally() {
        let plane = InMemoryControlPlane::new();
        let script = ProvisioningScript::new("x".repeat(MAX_ENCODED_SCRIPT_LEN));
        let err = manager(&plane).ensure("lc", &script).await.unwrap_err();
        match err {
            LifecycleError::ScriptTooLarge { len, limit, .. } => {
                assert!(len > limit);
                assert_eq!(limit, MAX_ENCODED_SCRIPT_LEN);
            }
            other => panic!("expected ScriptTooLarge, got {other:?}"),
        }
        assert_eq!(plane.calls().create_lifecycle_config, 0);
    }

    #[tokio::test]
    async fn other_rejections_propagate() {
        let plane = InMemoryControlPlane::new();
        plane.reject_next(
            Operation::CreateLifecycleConfig,
            ControlPlaneError::Rejected {
                operation: "create_lifecycle_config",
                code: "AccessDeniedException".to_string(),
                message: "not authorized".to_string(),
            },
        );
        let err = manager(&plane)
            .ensure("lc", &ProvisioningScript::new("#!/bin/bash\n"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ControlPlane(ControlPlaneError::Rejected { .. })
        ));
    }
}
