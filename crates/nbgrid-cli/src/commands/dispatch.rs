use std::path::Path;

use anyhow::{Result, bail};
use tokio::sync::watch;

use nbgrid_dispatch::{Classifier, DispatchOptions, Dispatcher, Workload};
use nbgrid_lifecycle::InServicePolicy;

/// Run every notebook in `dir` on its own instance. Fails if any job fails,
/// after all jobs have finished.
pub async fn dispatch(
    config: Option<&Path>,
    dir: &Path,
    max_concurrency: Option<usize>,
    restart: bool,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let raw = super::load_config(config)?;
    let mut options = DispatchOptions::new(raw.role_arn()?);
    options.instance_prefix = raw.dispatch.instance_prefix.clone();
    options.placement = raw.placement();
    options.volume_size_gb = raw.volume_size_gb()?;
    options.max_concurrency = max_concurrency.unwrap_or(raw.dispatch.max_concurrency);
    options.wait = raw.wait_settings()?;
    if restart {
        options.in_service = InServicePolicy::Restart;
    }
    let client = super::control_plane(&raw)?;

    let workloads = read_workloads(dir).await?;
    let dispatcher = Dispatcher::new(client, Classifier::from(&raw.dispatch), options);
    let reports = dispatcher
        .dispatch(workloads, &raw.dispatch.profiles, cancel)
        .await;

    let mut failed = 0;
    for report in &reports {
        match (&report.job, &report.result) {
            (Some(job), Ok(state)) => {
                println!("✓ {} → {} ({state})", report.identifier, job.instance_name);
                println!("  {}: {}", job.category, job.profile.instance_type);
            }
            (_, Err(e)) => {
                failed += 1;
                eprintln!("✗ {}: {e}", report.identifier);
            }
            (None, Ok(_)) => {}
        }
    }
    if failed > 0 {
        bail!("{failed} of {} job(s) failed", reports.len());
    }
    Ok(())
}

async fn read_workloads(dir: &Path) -> Result<Vec<Workload>> {
    let notebooks = nbgrid_notebook::read_notebooks(dir).await?;
    Ok(notebooks
        .into_iter()
        .map(|(name, content)| Workload::new(name, content))
        .collect())
}
