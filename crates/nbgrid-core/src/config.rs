//! nbgrid configuration: optional `nbgrid.toml` overlaid by environment
//! variables.
//!
//! Configuration is assembled once at the process boundary and handed to the
//! components by value. Nothing below the CLI reads the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{
    Category, ClassificationRule, DEFAULT_VOLUME_SIZE_GB, NetworkPlacement, ProfileTable,
    ResourceDescriptor, ResourceProfile,
};

pub const ENV_INSTANCE_NAME: &str = "NOTEBOOK_INSTANCE_NAME";
pub const ENV_INSTANCE_TYPE: &str = "INSTANCE_TYPE";
pub const ENV_ROLE_ARN: &str = "ROLE_ARN";
pub const ENV_LIFECYCLE_CONFIG_NAME: &str = "LIFECYCLE_CONFIG_NAME";
pub const ENV_IMAGE_NAME: &str = "IMAGE_NAME";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_BUCKET: &str = "S3_BUCKET";
pub const ENV_KEY_PREFIX: &str = "S3_KEY_PREFIX";
pub const ENV_OUTPUT_BUCKET: &str = "OUTPUT_S3_BUCKET";
pub const ENV_OUTPUT_KEY_PREFIX: &str = "OUTPUT_S3_KEY_PREFIX";
pub const ENV_SUBNET_ID: &str = "NBGRID_SUBNET_ID";
pub const ENV_SECURITY_GROUP_IDS: &str = "NBGRID_SECURITY_GROUP_IDS";
pub const ENV_CONTROL_PLANE_ENDPOINT: &str = "NBGRID_CONTROL_PLANE_ENDPOINT";
pub const ENV_OBJECT_STORE_ENDPOINT: &str = "NBGRID_OBJECT_STORE_ENDPOINT";
pub const ENV_POLL_INTERVAL_SECS: &str = "NBGRID_POLL_INTERVAL_SECS";
pub const ENV_STOP_TIMEOUT_SECS: &str = "NBGRID_STOP_TIMEOUT_SECS";
pub const ENV_START_TIMEOUT_SECS: &str = "NBGRID_START_TIMEOUT_SECS";

// ── Unresolved layer ──────────────────────────────────────────────

/// Configuration as read from file and environment, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub region: Option<String>,
    pub instance: RawInstance,
    pub store: RawStore,
    pub control_plane: RawControlPlane,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInstance {
    pub name: Option<String>,
    pub instance_type: Option<String>,
    pub role_arn: Option<String>,
    pub lifecycle_config_name: Option<String>,
    pub runtime_image: Option<String>,
    pub volume_size_gb: Option<u32>,
    pub direct_internet_access: Option<bool>,
    pub subnet_id: Option<String>,
    pub security_group_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStore {
    pub bucket: Option<String>,
    pub key_prefix: Option<String>,
    pub output_bucket: Option<String>,
    pub output_key_prefix: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawControlPlane {
    pub endpoint: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub stop_timeout_secs: Option<u64>,
    pub start_timeout_secs: Option<u64>,
}

// ── Resolved layer ────────────────────────────────────────────────

/// Everything needed to describe the single managed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSettings {
    pub name: String,
    pub profile: ResourceProfile,
    pub role_arn: String,
    pub lifecycle_config_name: String,
    pub placement: NetworkPlacement,
    pub volume_size_gb: u32,
}

impl InstanceSettings {
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            name: self.name.clone(),
            profile: self.profile.clone(),
            role_arn: self.role_arn.clone(),
            lifecycle_config_name: self.lifecycle_config_name.clone(),
            placement: self.placement.clone(),
            volume_size_gb: self.volume_size_gb,
            root_access: true,
        }
    }
}

/// Object-store locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub bucket: String,
    pub key_prefix: String,
    pub output_bucket: Option<String>,
    pub output_key_prefix: Option<String>,
    pub endpoint: Option<String>,
}

impl StoreSettings {
    /// Output bucket and key prefix for executed notebooks.
    pub fn output(&self) -> ConfigResult<(String, String)> {
        let bucket = require(&self.output_bucket, "output_bucket", ENV_OUTPUT_BUCKET)?;
        let prefix = require(&self.output_key_prefix, "output_key_prefix", ENV_OUTPUT_KEY_PREFIX)?;
        Ok((bucket, prefix))
    }
}

/// Poll cadence and bounds for state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    pub start_timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(30 * 60),
            start_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Batch dispatch settings (`[dispatch]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Prefix for per-job instance names.
    pub instance_prefix: String,
    pub max_concurrency: usize,
    /// Evaluated in order; the first match wins.
    pub rules: Vec<ClassificationRule>,
    pub profiles: ProfileTable,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            instance_prefix: "nbgrid".to_string(),
            max_concurrency: 4,
            rules: vec![
                ClassificationRule::new("training", Category::Training),
                ClassificationRule::new("monitoring", Category::Monitoring),
            ],
            profiles: ProfileTable::default(),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub region: String,
    pub instance: InstanceSettings,
    pub store: StoreSettings,
    pub control_plane_endpoint: Option<String>,
    pub wait: WaitSettings,
    pub dispatch: DispatchSettings,
}

impl GridConfig {
    /// Resolve from a key lookup only (no file).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut raw = RawConfig::default();
        raw.apply_env(lookup)?;
        raw.resolve()
    }
}

impl RawConfig {
    /// Read `path` (if given) and overlay the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut raw = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        raw.apply_env(|key| std::env::var(key).ok())?;
        Ok(raw)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from `lookup`. Empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        overlay(&mut self.instance.name, get(ENV_INSTANCE_NAME));
        overlay(&mut self.instance.instance_type, get(ENV_INSTANCE_TYPE));
        overlay(&mut self.instance.role_arn, get(ENV_ROLE_ARN));
        overlay(&mut self.instance.lifecycle_config_name, get(ENV_LIFECYCLE_CONFIG_NAME));
        overlay(&mut self.instance.runtime_image, get(ENV_IMAGE_NAME));
        overlay(&mut self.instance.subnet_id, get(ENV_SUBNET_ID));
        overlay(
            &mut self.instance.security_group_ids,
            get(ENV_SECURITY_GROUP_IDS).map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        );
        overlay(&mut self.region, get(ENV_REGION));
        overlay(&mut self.store.bucket, get(ENV_BUCKET));
        overlay(&mut self.store.key_prefix, get(ENV_KEY_PREFIX));
        overlay(&mut self.store.output_bucket, get(ENV_OUTPUT_BUCKET));
        overlay(&mut self.store.output_key_prefix, get(ENV_OUTPUT_KEY_PREFIX));
        overlay(&mut self.store.endpoint, get(ENV_OBJECT_STORE_ENDPOINT));
        overlay(&mut self.control_plane.endpoint, get(ENV_CONTROL_PLANE_ENDPOINT));
        overlay(
            &mut self.control_plane.poll_interval_secs,
            parse_secs("poll_interval_secs", get(ENV_POLL_INTERVAL_SECS))?,
        );
        overlay(
            &mut self.control_plane.stop_timeout_secs,
            parse_secs("stop_timeout_secs", get(ENV_STOP_TIMEOUT_SECS))?,
        );
        overlay(
            &mut self.control_plane.start_timeout_secs,
            parse_secs("start_timeout_secs", get(ENV_START_TIMEOUT_SECS))?,
        );
        Ok(())
    }

    /// Resolve every section. Required fields are checked in a fixed order.
    pub fn resolve(self) -> ConfigResult<GridConfig> {
        let instance = self.instance_settings()?;
        let region = self.region()?;
        let store = self.store_settings()?;
        let wait = self.wait_settings()?;
        Ok(GridConfig {
            region,
            instance,
            store,
            control_plane_endpoint: self.control_plane.endpoint.clone(),
            wait,
            dispatch: self.dispatch,
        })
    }

    pub fn instance_settings(&self) -> ConfigResult<InstanceSettings> {
        let i = &self.instance;
        let name = require(&i.name, "instance_name", ENV_INSTANCE_NAME)?;
        let instance_type = require(&i.instance_type, "instance_type", ENV_INSTANCE_TYPE)?;
        let role_arn = require(&i.role_arn, "role_arn", ENV_ROLE_ARN)?;
        let lifecycle_config_name = require(
            &i.lifecycle_config_name,
            "lifecycle_config_name",
            ENV_LIFECYCLE_CONFIG_NAME,
        )?;

        Ok(InstanceSettings {
            name,
            profile: ResourceProfile {
                instance_type,
                runtime_image: i.runtime_image.clone(),
            },
            role_arn,
            lifecycle_config_name,
            placement: self.placement(),
            volume_size_gb: self.volume_size_gb()?,
        })
    }

    /// Placement shared by the managed instance and dispatched jobs.
    pub fn placement(&self) -> NetworkPlacement {
        let i = &self.instance;
        NetworkPlacement {
            direct_internet_access: i.direct_internet_access.unwrap_or(true),
            subnet_id: i.subnet_id.clone(),
            security_group_ids: i.security_group_ids.clone().unwrap_or_default(),
        }
    }

    pub fn volume_size_gb(&self) -> ConfigResult<u32> {
        let size = self.instance.volume_size_gb.unwrap_or(DEFAULT_VOLUME_SIZE_GB);
        if size == 0 {
            return Err(ConfigError::Invalid {
                field: "volume_size_gb",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(size)
    }

    pub fn region(&self) -> ConfigResult<String> {
        require(&self.region, "region", ENV_REGION)
    }

    pub fn store_settings(&self) -> ConfigResult<StoreSettings> {
        let s = &self.store;
        Ok(StoreSettings {
            bucket: require(&s.bucket, "bucket", ENV_BUCKET)?,
            key_prefix: require(&s.key_prefix, "key_prefix", ENV_KEY_PREFIX)?,
            output_bucket: s.output_bucket.clone(),
            output_key_prefix: s.output_key_prefix.clone(),
            endpoint: s.endpoint.clone(),
        })
    }

    pub fn lifecycle_config_name(&self) -> ConfigResult<String> {
        require(
            &self.instance.lifecycle_config_name,
            "lifecycle_config_name",
            ENV_LIFECYCLE_CONFIG_NAME,
        )
    }

    pub fn role_arn(&self) -> ConfigResult<String> {
        require(&self.instance.role_arn, "role_arn", ENV_ROLE_ARN)
    }

    /// Endpoint of the control plane, for commands that make remote calls.
    pub fn control_plane_endpoint(&self) -> ConfigResult<String> {
        require(
            &self.control_plane.endpoint,
            "control_plane_endpoint",
            ENV_CONTROL_PLANE_ENDPOINT,
        )
    }

    /// Endpoint of the object store, for commands that move artifacts.
    pub fn object_store_endpoint(&self) -> ConfigResult<String> {
        require(&self.store.endpoint, "object_store_endpoint", ENV_OBJECT_STORE_ENDPOINT)
    }

    pub fn wait_settings(&self) -> ConfigResult<WaitSettings> {
        let defaults = WaitSettings::default();
        let cp = &self.control_plane;
        let settings = WaitSettings {
            poll_interval: cp
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            stop_timeout: cp
                .stop_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stop_timeout),
            start_timeout: cp
                .start_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.start_timeout),
        };
        if settings.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(settings)
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn require(value: &Option<String>, field: &'static str, var: &'static str) -> ConfigResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingEnv { field, var }),
    }
}

fn parse_secs(field: &'static str, value: Option<String>) -> ConfigResult<Option<u64>> {
    value
        .map(|v| {
            v.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                field,
                reason: format!("{v:?}: {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_INSTANCE_NAME, "nb-reports".to_string()),
            (ENV_INSTANCE_TYPE, "ml.t3.medium".to_string()),
            (ENV_ROLE_ARN, "arn:aws:iam::123456789012:role/nb".to_string()),
            (ENV_LIFECYCLE_CONFIG_NAME, "nb-reports-lc".to_string()),
            (ENV_REGION, "eu-west-1".to_string()),
            (ENV_BUCKET, "notebooks".to_string()),
            (ENV_KEY_PREFIX, "team/reports".to_string()),
        ])
    }

    fn lookup<'a>(env: &'a HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| env.get(key).cloned()
    }

    #[test]
    fn resolves_from_environment() {
        let env = full_env();
        let config = GridConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.instance.name, "nb-reports");
        assert_eq!(config.instance.profile.instance_type, "ml.t3.medium");
        assert_eq!(config.instance.volume_size_gb, DEFAULT_VOLUME_SIZE_GB);
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.store.key_prefix, "team/reports");
        assert_eq!(config.store.output_bucket, None);
        assert_eq!(config.wait, WaitSettings::default());
    }

    #[test]
    fn each_missing_required_field_is_named() {
        let cases = [
            (ENV_INSTANCE_NAME, "instance_name"),
            (ENV_INSTANCE_TYPE, "instance_type"),
            (ENV_ROLE_ARN, "role_arn"),
            (ENV_LIFECYCLE_CONFIG_NAME, "lifecycle_config_name"),
            (ENV_REGION, "region"),
            (ENV_BUCKET, "bucket"),
            (ENV_KEY_PREFIX, "key_prefix"),
        ];
        for (var, field) in cases {
            let mut env = full_env();
            env.remove(var);
            let err = GridConfig::from_lookup(lookup(&env)).unwrap_err();
            assert_eq!(err.field(), Some(field), "omitting {var}");
            assert!(err.to_string().contains(var), "message should name {var}: {err}");
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = full_env();
        env.insert(ENV_ROLE_ARN, "   ".to_string());
        let err = GridConfig::from_lookup(lookup(&env)).unwrap_err();
        assert_eq!(err.field(), Some("role_arn"));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let mut env = full_env();
        env.insert(ENV_STOP_TIMEOUT_SECS, "ten".to_string());
        let err = GridConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stop_timeout_secs", .. }));
    }

    #[test]
    fn store_settings_resolve_without_instance_fields() {
        let env = HashMap::from([
            (ENV_BUCKET, "notebooks".to_string()),
            (ENV_KEY_PREFIX, "prefix".to_string()),
        ]);
        let mut raw = RawConfig::default();
        raw.apply_env(lookup(&env)).unwrap();
        let store = raw.store_settings().unwrap();
        assert_eq!(store.bucket, "notebooks");
        assert!(raw.instance_settings().is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let toml_str = r#"
region = "us-east-1"

[instance]
name = "from-file"
instance_type = "ml.t3.medium"
role_arn = "arn:role"
lifecycle_config_name = "lc"
volume_size_gb = 20

[store]
bucket = "file-bucket"
key_prefix = "file-prefix"

[control_plane]
endpoint = "http://127.0.0.1:4566"
poll_interval_secs = 5

[dispatch]
instance_prefix = "batch"
max_concurrency = 2
rules = [
    { contains = "monitoring", category = "monitoring" },
    { contains = "training", category = "training" },
]

[dispatch.profiles.training]
instance_type = "ml.g4dn.xlarge"
runtime_image = "notebook-al2-v2"

[dispatch.profiles.monitoring]
instance_type = "ml.t3.large"

[dispatch.profiles.default]
instance_type = "ml.t3.medium"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nbgrid.toml");
        std::fs::write(&path, toml_str).unwrap();

        let mut raw = RawConfig::from_file(&path).unwrap();
        let env = HashMap::from([(ENV_INSTANCE_NAME, "from-env".to_string())]);
        raw.apply_env(lookup(&env)).unwrap();
        let config = raw.resolve().unwrap();

        assert_eq!(config.instance.name, "from-env");
        assert_eq!(config.instance.volume_size_gb, 20);
        assert_eq!(config.store.bucket, "file-bucket");
        assert_eq!(config.control_plane_endpoint.as_deref(), Some("http://127.0.0.1:4566"));
        assert_eq!(config.wait.poll_interval, Duration::from_secs(5));
        assert_eq!(config.dispatch.instance_prefix, "batch");
        assert_eq!(config.dispatch.rules[0].category, Category::Monitoring);
        assert_eq!(
            config.dispatch.profiles.training.runtime_image.as_deref(),
            Some("notebook-al2-v2")
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = RawConfig::from_file(Path::new("/nonexistent/nbgrid.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn security_groups_split_on_commas() {
        let mut env = full_env();
        env.insert(ENV_SECURITY_GROUP_IDS, "sg-1, sg-2,,".to_string());
        let config = GridConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.instance.placement.security_group_ids, vec!["sg-1", "sg-2"]);
    }

    #[test]
    fn endpoints_are_required_on_demand() {
        let mut raw = RawConfig::default();
        raw.apply_env(lookup(&full_env())).unwrap();
        raw.store.endpoint = None;
        raw.control_plane.endpoint = None;

        let err = raw.object_store_endpoint().unwrap_err();
        assert_eq!(err.field(), Some("object_store_endpoint"));
        let err = raw.control_plane_endpoint().unwrap_err();
        assert!(err.to_string().contains(ENV_CONTROL_PLANE_ENDPOINT));

        raw.store.endpoint = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(raw.object_store_endpoint().unwrap(), "http://127.0.0.1:9000");
    }

    #[test]
    fn output_location_is_optional_until_used() {
        let config = GridConfig::from_lookup(lookup(&full_env())).unwrap();
        let err = config.store.output().unwrap_err();
        assert_eq!(err.field(), Some("output_bucket"));

        let mut env = full_env();
        env.insert(ENV_OUTPUT_BUCKET, "results".to_string());
        env.insert(ENV_OUTPUT_KEY_PREFIX, "executed".to_string());
        let config = GridConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(
            config.store.output().unwrap(),
            ("results".to_string(), "executed".to_string())
        );
    }
}
