//! Batch dispatcher: one instance per workload, bounded concurrency.

use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tracing::{error, info, warn};

use nbgrid_control::ControlPlane;
use nbgrid_core::script::DEFAULT_LOCAL_PATH;
use nbgrid_core::{
    DEFAULT_VOLUME_SIZE_GB, Job, NetworkPlacement, ProfileTable, ProvisioningScript,
    ResourceDescriptor, ResourceState, WaitSettings,
};
use nbgrid_lifecycle::{InServicePolicy, LifecycleConfigManager, Orchestrator};

use crate::classifier::Classifier;
use crate::error::{DispatchError, DispatchResult};
use crate::plan::plan_jobs;

/// A notebook to run: its file name and raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub identifier: String,
    pub content: Vec<u8>,
}

impl Workload {
    pub fn new(identifier: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier: identifier.into(),
            content: content.into(),
        }
    }
}

/// Settings shared by every job in a batch.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub instance_prefix: String,
    pub role_arn: String,
    pub placement: NetworkPlacement,
    pub volume_size_gb: u32,
    /// Jobs allowed to run at once. Zero is treated as one.
    pub max_concurrency: usize,
    /// Where the workload is written on the instance.
    pub local_path: String,
    pub wait: WaitSettings,
    pub in_service: InServicePolicy,
}

impl DispatchOptions {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            instance_prefix: "nbgrid".to_string(),
            role_arn: role_arn.into(),
            placement: NetworkPlacement::default(),
            volume_size_gb: DEFAULT_VOLUME_SIZE_GB,
            max_concurrency: 4,
            local_path: DEFAULT_LOCAL_PATH.to_string(),
            wait: WaitSettings::default(),
            in_service: InServicePolicy::default(),
        }
    }
}

/// Outcome of one workload in a batch.
#[derive(Debug)]
pub struct JobReport {
    pub identifier: String,
    /// `None` when planning failed before a job existed.
    pub job: Option<Job>,
    pub result: DispatchResult<ResourceState>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a batch of workloads, each on its own instance.
pub struct Dispatcher {
    client: Arc<dyn ControlPlane>,
    classifier: Classifier,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ControlPlane>, classifier: Classifier, options: DispatchOptions) -> Self {
        Self {
            client,
            classifier,
            options,
        }
    }

    /// Classify, name, and submit every workload.
    ///
    /// Reports come back in input order. A failing job never affects the
    /// others; planning failures make no remote calls.
    pub async fn dispatch(
        &self,
        workloads: Vec<Workload>,
        profiles: &ProfileTable,
        cancel: watch::Receiver<bool>,
    ) -> Vec<JobReport> {
        let plans = plan_jobs(
            workloads.iter().map(|w| w.identifier.as_str()),
            &self.classifier,
            profiles,
            &self.options.instance_prefix,
        );
        let limit = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        info!(
            jobs = workloads.len(),
            max_concurrency = self.options.max_concurrency.max(1),
            "dispatching batch"
        );

        let mut pending = Vec::with_capacity(workloads.len());
        for (workload, plan) in workloads.into_iter().zip(plans) {
            let job = match plan {
                Ok(job) => job,
                Err(e) => {
                    warn!(identifier = %workload.identifier, error = %e, "job not planned");
                    pending.push(Pending::Failed(JobReport {
                        identifier: workload.identifier,
                        job: None,
                        result: Err(e),
                    }));
                    continue;
                }
            };

            let client = Arc::clone(&self.client);
            let options = self.options.clone();
            let limit = Arc::clone(&limit);
            let cancel = cancel.clone();
            let task_job = job.clone();
            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancelled(cancel.clone()) => {
                        return Err(DispatchError::Cancelled {
                            identifier: task_job.identifier.clone(),
                        });
                    }
                    permit = limit.acquire_owned() => permit,
                };
                let _permit = permit.map_err(|e| DispatchError::Aborted {
                    identifier: task_job.identifier.clone(),
                    reason: e.to_string(),
                })?;
                submit(client, &options, &task_job, &workload.content, cancel).await
            });
            pending.push(Pending::Running(job, handle));
        }

        let mut reports = Vec::with_capacity(pending.len());
        for entry in pending {
            let report = match entry {
                Pending::Failed(report) => report,
                Pending::Running(job, handle) => {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(join) => Err(DispatchError::Aborted {
                            identifier: job.identifier.clone(),
                            reason: join.to_string(),
                        }),
                    };
                    match &result {
                        Ok(_) => info!(
                            identifier = %job.identifier,
                            instance = %job.instance_name,
                            "job in service"
                        ),
                        Err(e) => error!(
                            identifier = %job.identifier,
                            instance = %job.instance_name,
                            error = %e,
                            "job failed"
                        ),
                    }
                    JobReport {
                        identifier: job.identifier.clone(),
                        job: Some(job),
                        result,
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}

enum Pending {
    Failed(JobReport),
    Running(Job, tokio::task::JoinHandle<DispatchResult<ResourceState>>),
}

/// Ensure the job's lifecycle config, then bring its instance up.
async fn submit(
    client: Arc<dyn ControlPlane>,
    options: &DispatchOptions,
    job: &Job,
    content: &[u8],
    cancel: watch::Receiver<bool>,
) -> DispatchResult<ResourceState> {
    if *cancel.borrow() {
        return Err(DispatchError::Cancelled {
            identifier: job.identifier.clone(),
        });
    }
    let script = ProvisioningScript::embed_workload(&job.identifier, content, &options.local_path)?;
    LifecycleConfigManager::new(Arc::clone(&client))
        .ensure(&job.lifecycle_config_name, &script)
        .await?;

    let descriptor = ResourceDescriptor {
        name: job.instance_name.clone(),
        profile: job.profile.clone(),
        role_arn: options.role_arn.clone(),
        lifecycle_config_name: job.lifecycle_config_name.clone(),
        placement: options.placement.clone(),
        volume_size_gb: options.volume_size_gb,
        root_access: true,
    };
    let state = Orchestrator::new(client)
        .with_wait_settings(options.wait)
        .with_in_service_policy(options.in_service)
        .ensure_running(&descriptor, cancel)
        .await?;
    Ok(state)
}

/// Resolves once `cancel` reads `true`. Never resolves if the sender is gone.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
