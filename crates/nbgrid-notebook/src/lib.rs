//! nbgrid-notebook — move notebooks between disk, the object store, and an
//! execution engine.
//!
//! ```text
//! local dir ──discover/upload──▶ {bucket}/{prefix}/{name}.ipynb
//!                                        │ get
//!                                        ▼
//!                           NotebookExecutor (papermill)
//!                                        │ put
//!                                        ▼
//!                 {output_bucket}/{output_prefix}/{name}_executed.ipynb
//! ```

pub mod error;
pub mod execute;
pub mod relay;
pub mod upload;

pub use error::{NotebookError, NotebookResult};
pub use execute::{NotebookExecutor, PapermillExecutor};
pub use relay::{RunRequest, run_and_relay};
pub use upload::{UploadedNotebook, discover_notebooks, object_key, read_notebooks, upload_notebooks};
