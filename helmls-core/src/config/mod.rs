//! Configuration module for helm-ls.
//!
//! Layered editor configuration (read per activation) and provisioning
//! settings stored in SQLite.

mod layers;
mod settings;

pub use layers::{
    ConfigurationStore, Inspection, LayeredJsonConfig, MemoryConfig, EXECUTABLE_PATH_KEY,
    SIDECAR_PATH_KEY,
};
pub use settings::{ProvisionSettings, SETTINGS_KEY};
