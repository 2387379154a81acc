pub mod config;
pub mod error;
pub mod script;
pub mod types;

pub use config::{DispatchSettings, GridConfig, InstanceSettings, RawConfig, StoreSettings, WaitSettings};
pub use error::{ConfigError, ConfigResult, ScriptError};
pub use script::ProvisioningScript;
pub use types::*;
