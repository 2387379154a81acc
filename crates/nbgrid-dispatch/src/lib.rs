//! nbgrid-dispatch — turn a batch of notebook workloads into running instances.
//!
//! Each workload is classified by its identifier, mapped to a resource
//! profile, and given its own instance and lifecycle config. Jobs then run
//! as independent tasks, bounded by a concurrency limit.
//!
//! ```text
//! Workload ──▶ Classifier ──▶ Category ──▶ ProfileTable ──▶ Job
//!                                                            │
//!       ┌──────────────────── one task per job ──────────────┘
//!       ▼
//!   LifecycleConfigManager::ensure ──▶ Orchestrator::ensure_running
//! ```

pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod plan;

pub use classifier::Classifier;
pub use dispatcher::{DispatchOptions, Dispatcher, JobReport, Workload};
pub use error::{DispatchError, DispatchResult};
pub use plan::{instance_name, lifecycle_config_name, plan_jobs};
