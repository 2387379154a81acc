//! The control-plane interface consumed by the lifecycle orchestrator.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;

use nbgrid_core::{ResourceDescriptor, ResourceState};

use crate::error::ControlPlaneResult;
use crate::wait::{WaitOptions, WaitOutcome, poll_until};

/// Boxed future alias so the traits stay dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the control plane reports about an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub state: ResourceState,
    pub failure_reason: Option<String>,
}

impl InstanceStatus {
    pub fn new(state: ResourceState) -> Self {
        Self {
            state,
            failure_reason: None,
        }
    }
}

/// Outcome of a describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeResult {
    Found(InstanceStatus),
    NotFound,
}

impl DescribeResult {
    /// Observed state, with a missing resource reported as `Absent`.
    pub fn state(&self) -> ResourceState {
        match self {
            DescribeResult::Found(status) => status.state,
            DescribeResult::NotFound => ResourceState::Absent,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            DescribeResult::Found(status) => status.failure_reason.as_deref(),
            DescribeResult::NotFound => None,
        }
    }
}

/// Outcome of a lifecycle-config creation. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateConfigResult {
    Created,
    AlreadyExists,
}

/// Remote control plane for named notebook instances.
///
/// Implementations must be safe to share across tasks; the dispatcher drives
/// many resources through one client concurrently.
pub trait ControlPlane: Send + Sync {
    /// Report the current state of `name`.
    fn describe<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<DescribeResult>>;

    /// Create the resource. The control plane reports it as `Pending` afterwards.
    fn create<'a>(
        &'a self,
        descriptor: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, ControlPlaneResult<()>>;

    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>>;

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>>;

    /// Create a named on-start script from its base64 encoding.
    fn create_lifecycle_config<'a>(
        &'a self,
        name: &'a str,
        encoded_script: &'a str,
    ) -> BoxFuture<'a, ControlPlaneResult<CreateConfigResult>>;

    /// Poll `describe` until the resource reports one of `targets`.
    ///
    /// The default implementation is a cooperative poll loop bounded by
    /// `options.timeout` that also stops when `cancel` flips to `true`.
    fn wait_for<'a>(
        &'a self,
        name: &'a str,
        targets: &'a [ResourceState],
        options: WaitOptions,
        cancel: watch::Receiver<bool>,
    ) -> BoxFuture<'a, ControlPlaneResult<WaitOutcome>> {
        Box::pin(poll_until(self, name, targets, options, cancel))
    }
}
