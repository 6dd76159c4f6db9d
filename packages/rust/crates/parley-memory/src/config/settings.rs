//! Runtime settings loader for parley.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/settings.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/parley/settings.yaml`
//!
//! Merge precedence is user over system. Environment overrides are applied
//! afterwards by [`MemoryConfig::from_settings`](super::MemoryConfig::from_settings).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

use crate::observability::MemoryEvent;

const SYSTEM_SETTINGS_FILE: &str = "packages/conf/settings.yaml";
const USER_SETTINGS_FILE: &str = "parley/settings.yaml";
const CONFIG_HOME_DIR: &str = ".config";
static CONFIG_HOME_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub memory: MemorySettings,
}

/// `memory:` section. Every field is optional so partial files merge cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySettings {
    pub window_capacity: Option<usize>,
    pub keep_tail: Option<usize>,
    pub evict_count: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    pub window_max_age_secs: Option<u64>,
    pub backend: Option<String>,
    pub valkey_url: Option<String>,
    pub key_prefix: Option<String>,
    pub durable_attempts: Option<u32>,
    pub durable_timeout_ms: Option<u64>,
    pub durable_backoff_ms: Option<u64>,
    pub summary_async: Option<bool>,
    pub summary_max_chars: Option<usize>,
    pub summary_history_max: Option<usize>,
    pub idle_sweep_interval_secs: Option<u64>,
}

impl RuntimeSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            memory: self.memory.merge(overlay.memory),
        }
    }
}

impl MemorySettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            window_capacity: overlay.window_capacity.or(self.window_capacity),
            keep_tail: overlay.keep_tail.or(self.keep_tail),
            evict_count: overlay.evict_count.or(self.evict_count),
            idle_timeout_secs: overlay.idle_timeout_secs.or(self.idle_timeout_secs),
            window_max_age_secs: overlay.window_max_age_secs.or(self.window_max_age_secs),
            backend: overlay.backend.or(self.backend),
            valkey_url: overlay.valkey_url.or(self.valkey_url),
            key_prefix: overlay.key_prefix.or(self.key_prefix),
            durable_attempts: overlay.durable_attempts.or(self.durable_attempts),
            durable_timeout_ms: overlay.durable_timeout_ms.or(self.durable_timeout_ms),
            durable_backoff_ms: overlay.durable_backoff_ms.or(self.durable_backoff_ms),
            summary_async: overlay.summary_async.or(self.summary_async),
            summary_max_chars: overlay.summary_max_chars.or(self.summary_max_chars),
            summary_history_max: overlay.summary_history_max.or(self.summary_history_max),
            idle_sweep_interval_secs: overlay
                .idle_sweep_interval_secs
                .or(self.idle_sweep_interval_secs),
        }
    }
}

/// Load merged runtime settings (user overrides system).
pub fn load_runtime_settings() -> RuntimeSettings {
    let (system, user) = runtime_settings_paths();
    load_runtime_settings_from_paths(&system, &user)
}

/// `(system, user)` settings file locations for the current environment.
#[doc(hidden)]
pub fn runtime_settings_paths() -> (PathBuf, PathBuf) {
    let root = env_path("PRJ_ROOT")
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let config_home = CONFIG_HOME_OVERRIDE
        .get()
        .cloned()
        .or_else(|| env_path("PRJ_CONFIG_HOME"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_HOME_DIR));
    (
        root.join(SYSTEM_SETTINGS_FILE),
        anchored(&root, config_home).join(USER_SETTINGS_FILE),
    )
}

#[doc(hidden)]
pub fn load_runtime_settings_from_paths(system: &Path, user: &Path) -> RuntimeSettings {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> RuntimeSettings {
    if !path.exists() {
        return RuntimeSettings::default();
    }
    read_settings(path).unwrap_or_else(|error| {
        tracing::warn!(
            event = MemoryEvent::SettingsIgnored.as_str(),
            path = %path.display(),
            error = %format!("{error:#}"),
            "settings file ignored"
        );
        RuntimeSettings::default()
    })
}

fn read_settings(path: &Path) -> anyhow::Result<RuntimeSettings> {
    let raw = std::fs::read_to_string(path).context("failed to read settings file")?;
    serde_yaml::from_str(&raw).context("failed to parse settings yaml")
}

/// Point user settings at another config home (CLI `--conf`). First call wins.
///
/// Relative paths resolve against `PRJ_ROOT`, else the working directory.
pub fn set_config_home_override(path: impl Into<PathBuf>) {
    let path = path.into();
    if path.as_os_str().is_empty() {
        return;
    }
    if let Err(rejected) = CONFIG_HOME_OVERRIDE.set(path)
        && CONFIG_HOME_OVERRIDE.get() != Some(&rejected)
    {
        tracing::warn!(
            event = MemoryEvent::SettingsIgnored.as_str(),
            ignored = %rejected.display(),
            "config home already overridden; keeping the first value"
        );
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn anchored(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { root.join(path) }
}
