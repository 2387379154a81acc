//! Shared types used across nbgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default volume attached to a notebook instance, in GiB.
pub const DEFAULT_VOLUME_SIZE_GB: u32 = 5;

// ── Resource ──────────────────────────────────────────────────────

/// Identity and creation parameters of a named compute resource.
///
/// The `name` is the only identity key the control plane knows about.
/// Everything else is only read when the resource has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub profile: ResourceProfile,
    /// Execution role the instance assumes.
    pub role_arn: String,
    /// Name of the on-start provisioning script resource.
    pub lifecycle_config_name: String,
    #[serde(default)]
    pub placement: NetworkPlacement,
    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u32,
    #[serde(default = "default_true")]
    pub root_access: bool,
}

impl ResourceDescriptor {
    /// Descriptor with default placement, volume, and root access.
    pub fn new(
        name: impl Into<String>,
        profile: ResourceProfile,
        role_arn: impl Into<String>,
        lifecycle_config_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            profile,
            role_arn: role_arn.into(),
            lifecycle_config_name: lifecycle_config_name.into(),
            placement: NetworkPlacement::default(),
            volume_size_gb: DEFAULT_VOLUME_SIZE_GB,
            root_access: true,
        }
    }

    /// Check that every field the control plane requires for creation is set.
    ///
    /// Returns the first offending field so callers can fail before any
    /// remote call.
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("name", self.name.as_str()),
            ("instance_type", self.profile.instance_type.as_str()),
            ("role_arn", self.role_arn.as_str()),
            ("lifecycle_config_name", self.lifecycle_config_name.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        if self.volume_size_gb == 0 {
            return Err(ConfigError::Invalid {
                field: "volume_size_gb",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Network placement passed through to the control plane untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlacement {
    pub direct_internet_access: bool,
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

impl Default for NetworkPlacement {
    fn default() -> Self {
        Self {
            direct_internet_access: true,
            subnet_id: None,
            security_group_ids: Vec::new(),
        }
    }
}

/// Status of a named resource as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    /// Describe reported that no resource with this name exists.
    Absent,
    Pending,
    Stopped,
    Stopping,
    InService,
    Failed,
}

impl ResourceState {
    /// A state the resource cannot leave without operator intervention.
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Absent => "Absent",
            ResourceState::Pending => "Pending",
            ResourceState::Stopped => "Stopped",
            ResourceState::Stopping => "Stopping",
            ResourceState::InService => "InService",
            ResourceState::Failed => "Failed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dispatch ──────────────────────────────────────────────────────

/// Workload category resolved from a workload identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Training,
    Monitoring,
    Default,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Training => "training",
            Category::Monitoring => "monitoring",
            Category::Default => "default",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute class and runtime image for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub instance_type: String,
    pub runtime_image: Option<String>,
}

impl ResourceProfile {
    pub fn new(instance_type: impl Into<String>, runtime_image: Option<&str>) -> Self {
        Self {
            instance_type: instance_type.into(),
            runtime_image: runtime_image.map(str::to_string),
        }
    }
}

/// One resource profile per category.
///
/// Every category has an entry, so resolution cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTable {
    pub training: ResourceProfile,
    pub monitoring: ResourceProfile,
    pub default: ResourceProfile,
}

impl ProfileTable {
    pub fn resolve(&self, category: Category) -> &ResourceProfile {
        match category {
            Category::Training => &self.training,
            Category::Monitoring => &self.monitoring,
            Category::Default => &self.default,
        }
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            training: ResourceProfile::new("ml.p3.2xlarge", None),
            monitoring: ResourceProfile::new("ml.t3.large", None),
            default: ResourceProfile::new("ml.t3.medium", None),
        }
    }
}

/// A substring predicate mapping identifiers to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub contains: String,
    pub category: Category,
}

impl ClassificationRule {
    pub fn new(contains: impl Into<String>, category: Category) -> Self {
        Self {
            contains: contains.into(),
            category,
        }
    }

    pub fn matches(&self, identifier: &str) -> bool {
        identifier.contains(self.contains.as_str())
    }
}

/// A classified workload ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Workload identifier (the notebook file name).
    pub identifier: String,
    pub category: Category,
    pub profile: ResourceProfile,
    pub instance_name: String,
    pub lifecycle_config_name: String,
}

fn default_volume_size_gb() -> u32 {
    DEFAULT_VOLUME_SIZE_GB
}

fn default_true() -> bool {
    true
}
