//! Config namespace: YAML runtime settings and the validated memory config.

mod memory;
mod settings;

pub use memory::{BackendMode, DEFAULT_KEY_PREFIX, MemoryConfig};
pub use settings::{
    MemorySettings, RuntimeSettings, load_runtime_settings, load_runtime_settings_from_paths,
    runtime_settings_paths, set_config_home_override,
};
