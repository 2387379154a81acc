//! JSON-over-HTTP adapter for the managed notebook control plane.
//!
//! Speaks the AWS JSON 1.1 protocol (`X-Amz-Target: SageMaker.<Operation>`)
//! against an endpoint that fronts the real service. Request signing is the
//! endpoint's business. Remote error bodies are classified here and nowhere
//! else: "record not found" on describe becomes [`DescribeResult::NotFound`]
//! and "already exists" on lifecycle-config creation becomes
//! [`CreateConfigResult::AlreadyExists`].

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use nbgrid_core::{ResourceDescriptor, ResourceState};

use crate::client::{BoxFuture, ControlPlane, CreateConfigResult, DescribeResult, InstanceStatus};
use crate::error::{ControlPlaneError, ControlPlaneResult};
use crate::transport::{self, Endpoint};

const TARGET_PREFIX: &str = "SageMaker";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ── Wire shapes ───────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NameRequest<'a> {
    notebook_instance_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateInstanceRequest<'a> {
    notebook_instance_name: &'a str,
    instance_type: &'a str,
    role_arn: &'a str,
    lifecycle_config_name: &'a str,
    #[serde(rename = "VolumeSizeInGB")]
    volume_size_in_gb: u32,
    direct_internet_access: &'static str,
    root_access: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subnet_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform_identifier: Option<&'a str>,
}

impl<'a> CreateInstanceRequest<'a> {
    fn from_descriptor(d: &'a ResourceDescriptor) -> Self {
        Self {
            notebook_instance_name: &d.name,
            instance_type: &d.profile.instance_type,
            role_arn: &d.role_arn,
            lifecycle_config_name: &d.lifecycle_config_name,
            volume_size_in_gb: d.volume_size_gb,
            direct_internet_access: enabled(d.placement.direct_internet_access),
            root_access: enabled(d.root_access),
            subnet_id: d.placement.subnet_id.as_deref(),
            security_group_ids: Some(d.placement.security_group_ids.as_slice())
                .filter(|ids| !ids.is_empty()),
            platform_identifier: d.profile.runtime_image.as_deref(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateLifecycleConfigRequest<'a> {
    notebook_instance_lifecycle_config_name: &'a str,
    on_start: [ScriptContent<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScriptContent<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResponse {
    notebook_instance_status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

fn enabled(flag: bool) -> &'static str {
    if flag { "Enabled" } else { "Disabled" }
}

// ── Classification ────────────────────────────────────────────────

/// Map a remote status string onto [`ResourceState`].
///
/// `Updating` is a transitional state that settles like `Pending`.
/// `Deleting` and anything unknown are not states the orchestrator handles.
pub fn parse_status(status: &str) -> Option<ResourceState> {
    match status {
        "Pending" | "Updating" => Some(ResourceState::Pending),
        "InService" => Some(ResourceState::InService),
        "Stopping" => Some(ResourceState::Stopping),
        "Stopped" => Some(ResourceState::Stopped),
        "Failed" => Some(ResourceState::Failed),
        _ => None,
    }
}

/// Whether a rejected describe means the resource does not exist.
pub fn is_not_found(code: &str, message: &str) -> bool {
    code == "ResourceNotFound" || (code == "ValidationException" && message.contains("RecordNotFound"))
}

/// Whether a rejected create means the resource is already there.
pub fn is_already_exists(code: &str, message: &str) -> bool {
    code == "ValidationException" && message.to_ascii_lowercase().contains("already exists")
}

/// Extract the error code and message from a non-2xx response body.
fn remote_error(status: http::StatusCode, body: &[u8]) -> (String, String) {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            kind: Some(kind),
            message,
        }) => {
            // "com.amazonaws.sagemaker#ValidationException" → "ValidationException"
            let code = kind.rsplit('#').next().unwrap_or(&kind).to_string();
            (code, message.unwrap_or_default())
        }
        _ => (
            format!("HTTP {}", status.as_u16()),
            String::from_utf8_lossy(body).trim().to_string(),
        ),
    }
}

// ── Adapter ───────────────────────────────────────────────────────

/// [`ControlPlane`] backed by HTTP calls to a JSON 1.1 endpoint.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpControlPlane {
    /// Client for `endpoint`, e.g. `http://127.0.0.1:4566`.
    pub fn new(endpoint: &str) -> ControlPlaneResult<Self> {
        let endpoint = Endpoint::parse(endpoint).map_err(ControlPlaneError::InvalidEndpoint)?;
        Ok(Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<B: Serialize>(
        &self,
        operation: &'static str,
        target: &str,
        body: &B,
    ) -> ControlPlaneResult<Bytes> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ControlPlaneError::UnexpectedResponse(format!("encode {target}: {e}")))?;
        let amz_target = format!("{TARGET_PREFIX}.{target}");
        let headers = [
            ("content-type", CONTENT_TYPE),
            ("x-amz-target", amz_target.as_str()),
        ];
        let resp = transport::send(
            &self.endpoint,
            Method::POST,
            "/",
            &headers,
            Bytes::from(payload),
            self.timeout,
        )
        .await
        .map_err(ControlPlaneError::Transport)?;

        if resp.status.is_success() {
            return Ok(resp.body);
        }
        let (code, message) = remote_error(resp.status, &resp.body);
        debug!(%target, %code, %message, "control plane rejected call");
        Err(ControlPlaneError::Rejected {
            operation,
            code,
            message,
        })
    }

    async fn describe_inner(&self, name: &str) -> ControlPlaneResult<DescribeResult> {
        let request = NameRequest {
            notebook_instance_name: name,
        };
        let body = match self.call("describe", "DescribeNotebookInstance", &request).await {
            Ok(body) => body,
            Err(ControlPlaneError::Rejected { code, message, .. }) if is_not_found(&code, &message) => {
                return Ok(DescribeResult::NotFound);
            }
            Err(e) => return Err(e),
        };

        let parsed: DescribeResponse = serde_json::from_slice(&body)
            .map_err(|e| ControlPlaneError::UnexpectedResponse(format!("describe {name}: {e}")))?;
        let state = parse_status(&parsed.notebook_instance_status).ok_or_else(|| {
            ControlPlaneError::UnexpectedResponse(format!(
                "describe {name}: unhandled status {:?}",
                parsed.notebook_instance_status
            ))
        })?;
        Ok(DescribeResult::Found(InstanceStatus {
            state,
            failure_reason: parsed.failure_reason.filter(|r| !r.is_empty()),
        }))
    }

    async fn create_inner(&self, descriptor: &ResourceDescriptor) -> ControlPlaneResult<()> {
        let request = CreateInstanceRequest::from_descriptor(descriptor);
        self.call("create", "CreateNotebookInstance", &request).await?;
        info!(
            name = %descriptor.name,
            instance_type = %descriptor.profile.instance_type,
            "notebook instance create requested"
        );
        Ok(())
    }

    async fn start_inner(&self, name: &str) -> ControlPlaneResult<()> {
        let request = NameRequest {
            notebook_instance_name: name,
        };
        self.call("start", "StartNotebookInstance", &request).await?;
        info!(%name, "notebook instance start requested");
        Ok(())
    }

    async fn stop_inner(&self, name: &str) -> ControlPlaneResult<()> {
        let request = NameRequest {
            notebook_instance_name: name,
        };
        self.call("stop", "StopNotebookInstance", &request).await?;
        info!(%name, "notebook instance stop requested");
        Ok(())
    }

    async fn create_lifecycle_config_inner(
        &self,
        name: &str,
        encoded_script: &str,
    ) -> ControlPlaneResult<CreateConfigResult> {
        let request = CreateLifecycleConfigRequest {
            notebook_instance_lifecycle_config_name: name,
            on_start: [ScriptContent {
                content: encoded_script,
            }],
        };
        match self
            .call(
                "create_lifecycle_config",
                "CreateNotebookInstanceLifecycleConfig",
                &request,
            )
            .await
        {
            Ok(_) => Ok(CreateConfigResult::Created),
            Err(ControlPlaneError::Rejected { code, message, .. })
                if is_already_exists(&code, &message) =>
            {
                Ok(CreateConfigResult::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}

impl ControlPlane for HttpControlPlane {
    fn describe<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<DescribeResult>> {
        Box::pin(self.describe_inner(name))
    }

    fn create<'a>(
        &'a self,
        descriptor: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(self.create_inner(descriptor))
    }

    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(self.start_inner(name))
    }

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(self.stop_inner(name))
    }

    fn create_lifecycle_config<'a>(
        &'a self,
        name: &'a str,
        encoded_script: &'a str,
    ) -> BoxFuture<'a, ControlPlaneResult<CreateConfigResult>> {
        Box::pin(self.create_lifecycle_config_inner(name, encoded_script))
    }
}
