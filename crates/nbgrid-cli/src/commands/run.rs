use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::watch;

use nbgrid_notebook::{PapermillExecutor, RunRequest};

pub struct RunArgs {
    pub notebook: String,
    pub work_dir: PathBuf,
    pub papermill: PathBuf,
    pub papermill_args: Vec<String>,
    pub ensure_instance: bool,
}

/// Execute `{prefix}/{notebook}.ipynb` and upload the executed copy,
/// optionally bringing the configured instance up first.
pub async fn run(config: Option<&Path>, args: RunArgs, cancel: watch::Receiver<bool>) -> Result<()> {
    let raw = super::load_config(config)?;
    let settings = raw.store_settings()?;
    let (output_bucket, output_key_prefix) = settings.output()?;
    let store = super::object_store(&raw)?;

    if args.ensure_instance {
        super::provision::ensure_instance(&raw, false, cancel).await?;
    }

    let request = RunRequest {
        notebook_name: args.notebook.trim_end_matches(".ipynb").to_string(),
        bucket: settings.bucket,
        key_prefix: settings.key_prefix,
        output_bucket,
        output_key_prefix,
        work_dir: args.work_dir,
    };
    let executor = PapermillExecutor::with_program(args.papermill).with_args(args.papermill_args);

    let output_key = nbgrid_notebook::run_and_relay(&store, &executor, &request)
        .await
        .with_context(|| format!("running notebook {}", request.notebook_name))?;

    println!("✓ Executed {}", request.input_key());
    println!("  Output: s3://{}/{output_key}", request.output_bucket);
    Ok(())
}
