use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(
    name = "nbgrid",
    about = "nbgrid — provision notebook instances and run notebooks on them",
    version,
    propagate_version = true,
)]
struct Cli {
    /// TOML config file. Environment variables override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every .ipynb in a directory to {S3_BUCKET}/{S3_KEY_PREFIX}
    Upload {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Create the lifecycle config that syncs notebooks onto the instance
    LifecycleConfig,
    /// Bring the configured notebook instance to InService
    Ensure {
        /// Stop and start an instance that is already running so its
        /// lifecycle script runs again.
        #[arg(long)]
        restart: bool,
    },
    /// Upload notebooks, create the lifecycle config, and ensure the instance
    Deploy {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        restart: bool,
    },
    /// Run every notebook in a directory on its own instance.
    ///
    /// Instance type follows the notebook name: "training" and "monitoring"
    /// select their own profiles, anything else the default profile.
    Dispatch {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Override [dispatch].max_concurrency
        #[arg(long)]
        max_concurrency: Option<usize>,
        #[arg(long)]
        restart: bool,
    },
    /// Execute a stored notebook with papermill and upload the executed copy
    Run {
        /// Notebook name without the .ipynb extension
        #[arg(short, long)]
        notebook: String,
        /// Scratch directory for the input and executed files
        #[arg(long, default_value = "/tmp/nbgrid")]
        work_dir: PathBuf,
        /// papermill executable
        #[arg(long, default_value = "papermill")]
        papermill: PathBuf,
        /// Extra arguments passed to papermill after the paths
        #[arg(last = true)]
        papermill_args: Vec<String>,
        /// Ensure the configured instance is InService before running
        #[arg(long)]
        ensure_instance: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nbgrid=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    // Ctrl-C ends any in-flight wait; the orchestrator still reports the last state.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling waits");
            let _ = cancel_tx.send(true);
        }
    });

    match cli.command {
        Commands::Upload { dir } => commands::upload::upload(config, &dir).await,
        Commands::LifecycleConfig => commands::provision::lifecycle_config(config).await,
        Commands::Ensure { restart } => {
            commands::provision::ensure(config, restart, cancel_rx).await
        }
        Commands::Deploy { dir, restart } => {
            commands::provision::deploy(config, &dir, restart, cancel_rx).await
        }
        Commands::Dispatch {
            dir,
            max_concurrency,
            restart,
        } => commands::dispatch::dispatch(config, &dir, max_concurrency, restart, cancel_rx).await,
        Commands::Run {
            notebook,
            work_dir,
            papermill,
            papermill_args,
            ensure_instance,
        } => {
            let args = commands::run::RunArgs {
                notebook,
                work_dir,
                papermill,
                papermill_args,
                ensure_instance,
            };
            commands::run::run(config, args, cancel_rx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_flags_parse() {
        let cli = Cli::try_parse_from([
            "nbgrid",
            "--config",
            "nbgrid.toml",
            "dispatch",
            "--dir",
            "notebooks",
            "--max-concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("nbgrid.toml")));
        match cli.command {
            Commands::Dispatch {
                dir,
                max_concurrency,
                restart,
            } => {
                assert_eq!(dir, PathBuf::from("notebooks"));
                assert_eq!(max_concurrency, Some(2));
                assert!(!restart);
            }
            _ => panic!("expected dispatch"),
        }
    }

    #[test]
    fn run_passes_trailing_args_to_papermill() {
        let cli = Cli::try_parse_from([
            "nbgrid", "run", "-n", "report", "--", "-p", "alpha", "0.6",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                notebook,
                work_dir,
                papermill_args,
                ensure_instance,
                ..
            } => {
                assert_eq!(notebook, "report");
                assert_eq!(work_dir, PathBuf::from("/tmp/nbgrid"));
                assert_eq!(papermill_args, ["-p", "alpha", "0.6"]);
                assert!(!ensure_instance);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
