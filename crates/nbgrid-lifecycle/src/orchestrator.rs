//! Lifecycle orchestrator: drives one named resource to `InService`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use nbgrid_control::{ControlPlane, DescribeResult, InstanceStatus, WaitOptions, WaitOutcome};
use nbgrid_core::{ResourceDescriptor, ResourceState, WaitSettings};

use crate::error::{LifecycleResult, WaitCause, WaitError};

/// What to do with a resource that is already `InService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InServicePolicy {
    /// Leave it running.
    #[default]
    Reuse,
    /// Stop it and start it again so the lifecycle script reruns.
    Restart,
}

/// The next action for an observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    /// Wait for `Stopped` (or `InService`).
    AwaitStopped,
    /// Issue start, then wait for `InService`.
    Start,
    Stop,
    Done,
}

/// Transition table of the orchestrator.
pub fn next_step(observed: ResourceState, policy: InServicePolicy) -> Step {
    match observed {
        ResourceState::Absent => Step::Create,
        ResourceState::Pending | ResourceState::Stopping | ResourceState::Failed => {
            Step::AwaitStopped
        }
        ResourceState::Stopped => Step::Start,
        ResourceState::InService => match policy {
            InServicePolicy::Reuse => Step::Done,
            InServicePolicy::Restart => Step::Stop,
        },
    }
}

/// Converges named resources to `InService` through a [`ControlPlane`].
pub struct Orchestrator {
    client: Arc<dyn ControlPlane>,
    wait: WaitSettings,
    in_service: InServicePolicy,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            wait: WaitSettings::default(),
            in_service: InServicePolicy::default(),
        }
    }

    pub fn with_wait_settings(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_in_service_policy(mut self, policy: InServicePolicy) -> Self {
        self.in_service = policy;
        self
    }

    /// Bring `descriptor.name` to `InService`, creating it if needed.
    ///
    /// The descriptor is validated before any remote call. A set `cancel`
    /// stops the run before its next create, start or stop. Each wait is
    /// bounded by the configured timeout and ends early when `cancel` flips
    /// to `true`; a wait that does not reach its target is reported as
    /// [`LifecycleError::Wait`](crate::LifecycleError::Wait) with the state
    /// seen by a final describe.
    pub async fn ensure_running(
        &self,
        descriptor: &ResourceDescriptor,
        cancel: watch::Receiver<bool>,
    ) -> LifecycleResult<ResourceState> {
        descriptor.validate()?;
        let name = descriptor.name.as_str();

        let mut observed = self.client.describe(name).await?.state();
        info!(%name, state = %observed, "observed resource state");

        // The in-service policy applies to the state found on entry only.
        let mut policy = self.in_service;

        loop {
            let step = next_step(observed, policy);
            debug!(%name, state = %observed, ?step, "next lifecycle step");
            match step {
                Step::Done => {
                    info!(%name, "resource in service");
                    return Ok(ResourceState::InService);
                }
                Step::Create => {
                    self.check_cancelled(name, &cancel).await?;
                    self.client.create(descriptor).await?;
                    info!(
                        %name,
                        instance_type = %descriptor.profile.instance_type,
                        lifecycle_config = %descriptor.lifecycle_config_name,
                        "created resource"
                    );
                    observed = ResourceState::Pending;
                    policy = InServicePolicy::Reuse;
                }
                Step::AwaitStopped => {
                    observed = self
                        .await_state(
                            name,
                            ResourceState::Stopped,
                            &[ResourceState::Stopped, ResourceState::InService],
                            self.wait.stop_timeout,
                            &cancel,
                        )
                        .await?;
                }
                Step::Start => {
                    self.check_cancelled(name, &cancel).await?;
                    self.client.start(name).await?;
                    info!(%name, "started resource");
                    policy = InServicePolicy::Reuse;
                    observed = self
                        .await_state(
                            name,
                            ResourceState::InService,
                            &[ResourceState::InService],
                            self.wait.start_timeout,
                            &cancel,
                        )
                        .await?;
                }
                Step::Stop => {
                    self.check_cancelled(name, &cancel).await?;
                    self.client.stop(name).await?;
                    info!(%name, "stopped resource for restart");
                    observed = ResourceState::Stopping;
                    policy = InServicePolicy::Reuse;
                }
            }
        }
    }

    /// No create, start or stop is issued once `cancel` is set.
    async fn check_cancelled(
        &self,
        name: &str,
        cancel: &watch::Receiver<bool>,
    ) -> LifecycleResult<()> {
        if !*cancel.borrow() {
            return Ok(());
        }
        let err = self
            .wait_failure(name, ResourceState::InService, WaitCause::Cancelled, None)
            .await;
        Err(err.into())
    }

    async fn await_state(
        &self,
        name: &str,
        target: ResourceState,
        accept: &[ResourceState],
        timeout: Duration,
        cancel: &watch::Receiver<bool>,
    ) -> LifecycleResult<ResourceState> {
        let options = WaitOptions::new(timeout, self.wait.poll_interval);
        let outcome = self
            .client
            .wait_for(name, accept, options, cancel.clone())
            .await?;

        let (cause, seen) = match outcome {
            WaitOutcome::Reached(state) => return Ok(state),
            WaitOutcome::Terminal(status) => (WaitCause::Failed, Some(status)),
            WaitOutcome::Vanished => (WaitCause::Vanished, None),
            WaitOutcome::TimedOut { last } => (WaitCause::TimedOut, last),
            WaitOutcome::Cancelled { last } => (WaitCause::Cancelled, last),
        };
        Err(self.wait_failure(name, target, cause, seen).await.into())
    }

    /// Build the diagnostic for a failed wait from one last describe.
    async fn wait_failure(
        &self,
        name: &str,
        target: ResourceState,
        cause: WaitCause,
        seen: Option<InstanceStatus>,
    ) -> WaitError {
        let last = match self.client.describe(name).await {
            Ok(DescribeResult::Found(status)) => Some(status),
            Ok(DescribeResult::NotFound) => None,
            Err(e) => {
                warn!(%name, error = %e, "final describe failed; reporting last polled state");
                seen.clone()
            }
        };

        let last_state = last
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(ResourceState::Absent);
        let failure_reason = last
            .and_then(|s| s.failure_reason)
            .or_else(|| seen.and_then(|s| s.failure_reason));

        warn!(
            %name,
            %target,
            %cause,
            %last_state,
            failure_reason = failure_reason.as_deref().unwrap_or(""),
            "wait did not reach target"
        );
        WaitError {
            name: name.to_string(),
            target,
            cause,
            last_state,
            failure_reason,
        }
    }
}
