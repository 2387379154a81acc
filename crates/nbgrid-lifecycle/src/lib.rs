//! nbgrid-lifecycle — converge a named notebook instance to `InService`.
//!
//! The orchestrator observes the current state, picks the next step with a
//! pure transition function, issues at most one remote mutation per step,
//! and waits (bounded, cancellable) for the follow-up state.
//!
//! ```text
//!   Absent ──create──▶ Pending ──wait──▶ Stopped ──start──▶ Pending ──wait──▶ InService
//!                                          ▲
//!   Stopping ───────────wait───────────────┘
//!   Failed   ───────────wait → ends at once with the failure reason
//!   InService ── Reuse: done │ Restart: stop → Stopping
//! ```
//!
//! # Components
//!
//! - **`orchestrator`**: `ensure_running` and the `next_step` transition table
//! - **`config_manager`**: idempotent lifecycle-config creation

pub mod config_manager;
pub mod error;
pub mod orchestrator;

pub use config_manager::LifecycleConfigManager;
pub use error::{LifecycleError, LifecycleResult, WaitCause, WaitError};
pub use orchestrator::{InServicePolicy, Orchestrator, Step, next_step};
