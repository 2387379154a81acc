//! nbgrid-control — the seams between nbgrid and the remote services it drives.
//!
//! Two interfaces are consumed by the rest of the workspace:
//!
//! - [`ControlPlane`]: describe/create/start/stop for named notebook
//!   instances, lifecycle-config creation, and a bounded wait loop.
//! - [`ObjectStore`]: put/get of named artifacts.
//!
//! # Implementations
//!
//! ```text
//! ControlPlane
//!   ├── HttpControlPlane    (JSON-over-HTTP adapter; remote error text → typed results)
//!   └── InMemoryControlPlane (scripted transitions, call counting)
//! ObjectStore
//!   ├── HttpObjectStore     (path-style PUT/GET)
//!   └── InMemoryObjectStore
//! ```
//!
//! "Not found" and "already exists" are never errors at this layer: they are
//! [`DescribeResult::NotFound`] and [`CreateConfigResult::AlreadyExists`].
//! Matching on remote error text happens only inside the HTTP adapter.

pub mod client;
pub mod error;
pub mod http;
pub mod http_store;
pub mod memory;
pub mod store;
mod transport;
pub mod wait;

pub use client::{BoxFuture, ControlPlane, CreateConfigResult, DescribeResult, InstanceStatus};
pub use error::{ControlPlaneError, ControlPlaneResult, ObjectStoreError, ObjectStoreResult};
pub use http::HttpControlPlane;
pub use http_store::HttpObjectStore;
pub use memory::{CallCounts, InMemoryControlPlane, Operation, SimTiming};
pub use store::{InMemoryObjectStore, ObjectStore};
pub use wait::{WaitOptions, WaitOutcome};
