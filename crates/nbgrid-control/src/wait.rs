//! Bounded, cancellable polling for resource state transitions.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use nbgrid_core::ResourceState;

use crate::client::{ControlPlane, DescribeResult, InstanceStatus};
use crate::error::ControlPlaneResult;

/// Poll cadence and deadline for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The resource reported one of the target states.
    Reached(ResourceState),
    /// The resource entered a terminal state that is not a target.
    Terminal(InstanceStatus),
    /// Describe stopped finding the resource.
    Vanished,
    /// The deadline passed. `last` is the most recent status observed.
    TimedOut { last: Option<InstanceStatus> },
    /// The cancellation signal fired.
    Cancelled { last: Option<InstanceStatus> },
}

/// Poll `client.describe(name)` until a target state, a terminal state, the
/// deadline, or cancellation.
///
/// Describe errors end the wait and propagate unchanged.
pub async fn poll_until<C: ControlPlane + ?Sized>(
    client: &C,
    name: &str,
    targets: &[ResourceState],
    options: WaitOptions,
    mut cancel: watch::Receiver<bool>,
) -> ControlPlaneResult<WaitOutcome> {
    let deadline = Instant::now() + options.timeout;
    let mut last: Option<InstanceStatus> = None;
    let mut attempt: u32 = 0;

    loop {
        if *cancel.borrow() {
            debug!(%name, "wait cancelled");
            return Ok(WaitOutcome::Cancelled { last });
        }

        attempt += 1;
        match client.describe(name).await? {
            DescribeResult::NotFound => return Ok(WaitOutcome::Vanished),
            DescribeResult::Found(status) => {
                if targets.contains(&status.state) {
                    debug!(%name, state = %status.state, attempt, "target state reached");
                    return Ok(WaitOutcome::Reached(status.state));
                }
                if status.state.is_terminal() {
                    return Ok(WaitOutcome::Terminal(status));
                }
                debug!(%name, state = %status.state, attempt, "still waiting");
                last = Some(status);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut { last });
        }
        let wake = deadline.min(now + options.poll_interval);

        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {}
            changed = cancel.changed() => {
                // Sender gone: nobody can cancel any more, keep polling.
                if changed.is_err() {
                    tokio::time::sleep_until(wake).await;
                }
            }
        }
    }
}
