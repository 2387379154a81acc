//! In-memory control plane with scripted state transitions.
//!
//! Each operation that starts a transition (create, start, stop) schedules the
//! follow-up state to appear after a fixed number of `describe` calls, so
//! tests drive the lifecycle deterministically without wall-clock delays.
//! Every call is counted and any operation can be made to fail once.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use nbgrid_core::{ResourceDescriptor, ResourceState};

use crate::client::{BoxFuture, ControlPlane, CreateConfigResult, DescribeResult, InstanceStatus};
use crate::error::{ControlPlaneError, ControlPlaneResult};

/// Number of describes before each scripted transition becomes visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    /// `Pending` → `Stopped` after create (or for a seeded `Pending`).
    pub create_polls: u32,
    /// `Pending` → `InService` after start.
    pub start_polls: u32,
    /// `Stopping` → `Stopped` after stop (or for a seeded `Stopping`).
    pub stop_polls: u32,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            create_polls: 1,
            start_polls: 1,
            stop_polls: 1,
        }
    }
}

/// Control-plane operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Describe,
    Create,
    Start,
    Stop,
    CreateLifecycleConfig,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Describe => "describe",
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::CreateLifecycleConfig => "create_lifecycle_config",
        }
    }
}

/// Calls received so far, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub describe: u32,
    pub create: u32,
    pub start: u32,
    pub stop: u32,
    pub create_lifecycle_config: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.describe + self.create + self.start + self.stop + self.create_lifecycle_config
    }

    fn bump(&mut self, op: Operation) {
        match op {
            Operation::Describe => self.describe += 1,
            Operation::Create => self.create += 1,
            Operation::Start => self.start += 1,
            Operation::Stop => self.stop += 1,
            Operation::CreateLifecycleConfig => self.create_lifecycle_config += 1,
        }
    }
}

#[derive(Debug)]
struct Transition {
    remaining: u32,
    to: ResourceState,
    failure_reason: Option<String>,
}

#[derive(Debug)]
struct SimResource {
    status: InstanceStatus,
    transition: Option<Transition>,
    descriptor: Option<ResourceDescriptor>,
}

impl SimResource {
    fn new(state: ResourceState) -> Self {
        Self {
            status: InstanceStatus::new(state),
            transition: None,
            descriptor: None,
        }
    }

    fn schedule(&mut self, polls: u32, to: ResourceState, failure_reason: Option<String>) {
        if polls == 0 {
            self.status = InstanceStatus {
                state: to,
                failure_reason,
            };
            self.transition = None;
        } else {
            self.transition = Some(Transition {
                remaining: polls,
                to,
                failure_reason,
            });
        }
    }

    fn tick(&mut self) {
        if let Some(t) = self.transition.as_mut() {
            t.remaining = t.remaining.saturating_sub(1);
            if t.remaining == 0 {
                if let Some(t) = self.transition.take() {
                    self.status = InstanceStatus {
                        state: t.to,
                        failure_reason: t.failure_reason,
                    };
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    timing: SimTiming,
    resources: HashMap<String, SimResource>,
    lifecycle_configs: HashMap<String, String>,
    calls: CallCounts,
    rejections: HashMap<Operation, VecDeque<ControlPlaneError>>,
    start_failure: Option<String>,
}

impl Inner {
    /// Count the call and pop an injected failure, if one is queued.
    fn enter(&mut self, op: Operation) -> ControlPlaneResult<()> {
        self.calls.bump(op);
        match self.rejections.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A control plane held entirely in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timing(timing: SimTiming) -> Self {
        let plane = Self::default();
        plane.lock().timing = timing;
        plane
    }

    /// Insert an existing resource. Transitional states settle as they
    /// would after the matching operation.
    pub fn seed(&self, name: &str, state: ResourceState) {
        let mut inner = self.lock();
        let timing = inner.timing;
        let mut resource = SimResource::new(state);
        match state {
            ResourceState::Pending => resource.schedule(timing.create_polls, ResourceState::Stopped, None),
            ResourceState::Stopping => resource.schedule(timing.stop_polls, ResourceState::Stopped, None),
            _ => {}
        }
        inner.resources.insert(name.to_string(), resource);
    }

    /// Insert a resource that never leaves `state` on its own.
    pub fn seed_stuck(&self, name: &str, state: ResourceState) {
        self.lock()
            .resources
            .insert(name.to_string(), SimResource::new(state));
    }

    /// Insert a resource in `Failed` with a failure reason.
    pub fn seed_failed(&self, name: &str, reason: &str) {
        let mut resource = SimResource::new(ResourceState::Failed);
        resource.status.failure_reason = Some(reason.to_string());
        self.lock().resources.insert(name.to_string(), resource);
    }

    /// Make every later start end in `Failed` with `reason`.
    pub fn fail_starts_with(&self, reason: &str) {
        self.lock().start_failure = Some(reason.to_string());
    }

    /// Queue a failure for the next call of `op`.
    pub fn reject_next(&self, op: Operation, err: ControlPlaneError) {
        self.lock().rejections.entry(op).or_default().push_back(err);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Current state without counting a describe.
    pub fn state_of(&self, name: &str) -> ResourceState {
        self.lock()
            .resources
            .get(name)
            .map(|r| r.status.state)
            .unwrap_or(ResourceState::Absent)
    }

    /// The descriptor a resource was created from.
    pub fn created_descriptor(&self, name: &str) -> Option<ResourceDescriptor> {
        self.lock()
            .resources
            .get(name)
            .and_then(|r| r.descriptor.clone())
    }

    /// Encoded content of a stored lifecycle config.
    pub fn lifecycle_config(&self, name: &str) -> Option<String> {
        self.lock().lifecycle_configs.get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn describe_now(&self, name: &str) -> ControlPlaneResult<DescribeResult> {
        let mut inner = self.lock();
        inner.enter(Operation::Describe)?;
        Ok(match inner.resources.get_mut(name) {
            Some(resource) => {
                resource.tick();
                DescribeResult::Found(resource.status.clone())
            }
            None => DescribeResult::NotFound,
        })
    }

    fn create_now(&self, descriptor: &ResourceDescriptor) -> ControlPlaneResult<()> {
        let mut inner = self.lock();
        inner.enter(Operation::Create)?;
        if inner.resources.contains_key(&descriptor.name) {
            return Err(validation(
                Operation::Create,
                format!("Cannot create a duplicate Notebook Instance ({})", descriptor.name),
            ));
        }
        let timing = inner.timing;
        let mut resource = SimResource::new(ResourceState::Pending);
        resource.descriptor = Some(descriptor.clone());
        resource.schedule(timing.create_polls, ResourceState::Stopped, None);
        inner.resources.insert(descriptor.name.clone(), resource);
        debug!(name = %descriptor.name, "simulated resource created");
        Ok(())
    }

    fn start_now(&self, name: &str) -> ControlPlaneResult<()> {
        let mut inner = self.lock();
        inner.enter(Operation::Start)?;
        let timing = inner.timing;
        let start_failure = inner.start_failure.clone();
        let resource = inner
            .resources
            .get_mut(name)
            .ok_or_else(|| validation(Operation::Start, "RecordNotFound".to_string()))?;
        match resource.status.state {
            ResourceState::Stopped | ResourceState::Failed => {
                resource.status = InstanceStatus::new(ResourceState::Pending);
                match start_failure {
                    Some(reason) => {
                        resource.schedule(timing.start_polls, ResourceState::Failed, Some(reason))
                    }
                    None => resource.schedule(timing.start_polls, ResourceState::InService, None),
                }
                Ok(())
            }
            other => Err(validation(
                Operation::Start,
                format!("Status ({other}) not in ([Stopped, Failed]). Unable to transition to (Pending)"),
            )),
        }
    }

    fn stop_now(&self, name: &str) -> ControlPlaneResult<()> {
        let mut inner = self.lock();
        inner.enter(Operation::Stop)?;
        let timing = inner.timing;
        let resource = inner
            .resources
            .get_mut(name)
            .ok_or_else(|| validation(Operation::Stop, "RecordNotFound".to_string()))?;
        match resource.status.state {
            ResourceState::InService => {
                resource.status = InstanceStatus::new(ResourceState::Stopping);
                resource.schedule(timing.stop_polls, ResourceState::Stopped, None);
                Ok(())
            }
            other => Err(validation(
                Operation::Stop,
                format!("Status ({other}) not in ([InService]). Unable to transition to (Stopping)"),
            )),
        }
    }

    fn create_lifecycle_config_now(
        &self,
        name: &str,
        encoded_script: &str,
    ) -> ControlPlaneResult<CreateConfigResult> {
        let mut inner = self.lock();
        inner.enter(Operation::CreateLifecycleConfig)?;
        if inner.lifecycle_configs.contains_key(name) {
            return Ok(CreateConfigResult::AlreadyExists);
        }
        inner
            .lifecycle_configs
            .insert(name.to_string(), encoded_script.to_string());
        Ok(CreateConfigResult::Created)
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn describe<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<DescribeResult>> {
        Box::pin(async move { self.describe_now(name) })
    }

    fn create<'a>(
        &'a self,
        descriptor: &'a ResourceDescriptor,
    ) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(async move { self.create_now(descriptor) })
    }

    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(async move { self.start_now(name) })
    }

    fn stop<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ControlPlaneResult<()>> {
        Box::pin(async move { self.stop_now(name) })
    }

    fn create_lifecycle_config<'a>(
        &'a self,
        name: &'a str,
        encoded_script: &'a str,
    ) -> BoxFuture<'a, ControlPlaneResult<CreateConfigResult>> {
        Box::pin(async move { self.create_lifecycle_config_now(name, encoded_script) })
    }
}

fn validation(op: Operation, message: String) -> ControlPlaneError {
    ControlPlaneError::Rejected {
        operation: op.as_str(),
        code: "ValidationException".to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbgrid_core::ResourceProfile;

    fn descriptor(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(name, ResourceProfile::new("ml.t3.medium", None), "arn:role", "lc")
    }

    #[tokio::test]
    async fn describe_missing_is_not_found() {
        let plane = InMemoryControlPlane::new();
        assert_eq!(plane.describe("nb").await.unwrap(), DescribeResult::NotFound);
        assert_eq!(plane.calls().describe, 1);
    }

    #[tokio::test]
    async fn create_then_settles_to_stopped() {
        let plane = InMemoryControlPlane::with_timing(SimTiming {
            create_polls: 2,
            ..SimTiming::default()
        });
        plane.create(&descriptor("nb")).await.unwrap();
        assert_eq!(plane.state_of("nb"), ResourceState::Pending);

        assert_eq!(plane.describe("nb").await.unwrap().state(), ResourceState::Pending);
        assert_eq!(plane.describe("nb").await.unwrap().state(), ResourceState::Stopped);
        assert_eq!(plane.created_descriptor("nb"), Some(descriptor("nb")));
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let plane = InMemoryControlPlane::new();
        plane.create(&descriptor("nb")).await.unwrap();
        let err = plane.create(&descriptor("nb")).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Rejected { operation: "create", .. }));
    }

    #[tokio::test]
    async fn start_only_from_stopped_or_failed() {
        let plane = InMemoryControlPlane::new();
        plane.seed("nb", ResourceState::InService);
        assert!(plane.start("nb").await.is_err());

        plane.seed("nb", ResourceState::Stopped);
        plane.start("nb").await.unwrap();
        assert_eq!(plane.state_of("nb"), ResourceState::Pending);
        assert_eq!(plane.describe("nb").await.unwrap().state(), ResourceState::InService);
    }

    #[tokio::test]
    async fn start_failure_surfaces_reason() {
        let plane = InMemoryControlPlane::new();
        plane.seed("nb", ResourceState::Stopped);
        plane.fail_starts_with("lifecycle script exited 1");
        plane.start("nb").await.unwrap();

        let described = plane.describe("nb").await.unwrap();
        assert_eq!(described.state(), ResourceState::Failed);
        assert_eq!(described.failure_reason(), Some("lifecycle script exited 1"));
    }

    #[tokio::test]
    async fn stop_from_in_service() {
        let plane = InMemoryControlPlane::new();
        plane.seed("nb", ResourceState::InService);
        plane.stop("nb").await.unwrap();
        assert_eq!(plane.state_of("nb"), ResourceState::Stopping);
        assert_eq!(plane.describe("nb").await.unwrap().state(), ResourceState::Stopped);
        assert!(plane.stop("nb").await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_config_is_idempotent() {
        let plane = InMemoryControlPlane::new();
        assert_eq!(
            plane.create_lifecycle_config("lc", "ZWNobw==").await.unwrap(),
            CreateConfigResult::Created
        );
        assert_eq!(
            plane.create_lifecycle_config("lc", "b3RoZXI=").await.unwrap(),
            CreateConfigResult::AlreadyExists
        );
        assert_eq!(plane.lifecycle_config("lc").as_deref(), Some("ZWNobw=="));
    }

    #[tokio::test]
    async fn injected_rejection_fires_once() {
        let plane = InMemoryControlPlane::new();
        plane.reject_next(
            Operation::Describe,
            ControlPlaneError::Transport("connection reset".to_string()),
        );
        assert!(plane.describe("nb").await.is_err());
        assert!(plane.describe("nb").await.is_ok());
        assert_eq!(plane.calls().describe, 2);
    }
}
