use std::str::FromStr;
use std::time::Duration;

use parley_window::WindowBounds;

use super::settings::{MemorySettings, RuntimeSettings};
use crate::error::{MemoryError, Result};
use crate::retry::RetryPolicy;

/// Default Valkey key namespace.
pub const DEFAULT_KEY_PREFIX: &str = "parley:memory";
const DEFAULT_SUMMARY_MAX_CHARS: usize = 480;
const DEFAULT_SUMMARY_HISTORY_MAX: usize = 8;

/// Which storage backs the window, log and summary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// Valkey when a URL is configured, in-process otherwise.
    #[default]
    Auto,
    /// In-process maps only.
    Memory,
    /// Valkey; a URL is required.
    Valkey,
}

impl FromStr for BackendMode {
    type Err = MemoryError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "memory" | "local" => Ok(Self::Memory),
            "valkey" | "redis" => Ok(Self::Valkey),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown memory backend `{other}`; expected auto|memory|valkey"
            ))),
        }
    }
}

/// Validated coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Window count/age bounds.
    pub bounds: WindowBounds,
    /// Windows untouched this long are dropped.
    pub idle_timeout: Duration,
    /// Backend selection.
    pub backend: BackendMode,
    /// Valkey connection URL.
    pub valkey_url: Option<String>,
    /// Valkey key namespace.
    pub key_prefix: String,
    /// Retry budget for durable log and summary store calls.
    pub retry: RetryPolicy,
    /// Summarize on a spawned task instead of inside `append`.
    pub summary_async: bool,
    /// Rule summarizer output cap.
    pub summary_max_chars: usize,
    /// Prior summaries retained per session.
    pub summary_history_max: usize,
    /// Sweeper period; `None` disables the background sweeper.
    pub idle_sweep_interval: Option<Duration>,
}

impl MemoryConfig {
    /// Config with the three required bounds and defaults elsewhere.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when a bound is zero or `evict_count > capacity`.
    pub fn new(capacity: usize, evict_count: usize, idle_timeout: Duration) -> Result<Self> {
        validate_bounds(capacity, 0, evict_count)?;
        if idle_timeout.is_zero() {
            return Err(MemoryError::InvalidConfig(
                "idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            bounds: WindowBounds::new(capacity, 0, evict_count),
            idle_timeout,
            backend: BackendMode::Memory,
            valkey_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            retry: RetryPolicy::default(),
            summary_async: true,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            summary_history_max: DEFAULT_SUMMARY_HISTORY_MAX,
            idle_sweep_interval: None,
        })
    }

    /// Set the low-water offset.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when `keep_tail >= capacity`.
    pub fn with_keep_tail(mut self, keep_tail: usize) -> Result<Self> {
        validate_bounds(self.bounds.capacity, keep_tail, self.bounds.evict_count)?;
        self.bounds = WindowBounds::new(self.bounds.capacity, keep_tail, self.bounds.evict_count)
            .with_max_age_ms(self.bounds.max_age_ms);
        Ok(self)
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.bounds = self.bounds.with_max_age_ms(max_age.map(duration_ms));
        self
    }

    #[must_use]
    pub fn with_summary_async(mut self, summary_async: bool) -> Self {
        self.summary_async = summary_async;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_summary_history_max(mut self, max: usize) -> Self {
        self.summary_history_max = max;
        self
    }

    /// Idle timeout in milliseconds.
    #[must_use]
    pub fn idle_timeout_ms(&self) -> u64 {
        duration_ms(self.idle_timeout)
    }

    /// Build from merged settings plus process environment.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for missing required bounds or malformed values.
    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self> {
        Self::from_settings_with_env(settings, |name| std::env::var(name).ok())
    }

    /// Build from merged settings with an explicit env lookup.
    ///
    /// Env overrides: `VALKEY_URL`, `PARLEY_MEMORY_BACKEND`, `PARLEY_MEMORY_KEY_PREFIX`,
    /// `PARLEY_MEMORY_WINDOW_CAPACITY`, `PARLEY_MEMORY_KEEP_TAIL`,
    /// `PARLEY_MEMORY_EVICT_COUNT`, `PARLEY_MEMORY_IDLE_TIMEOUT_SECS`,
    /// `PARLEY_MEMORY_SUMMARY_ASYNC`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for missing required bounds or malformed values.
    pub fn from_settings_with_env<F>(settings: &RuntimeSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let memory: &MemorySettings = &settings.memory;
        let non_empty_env = |name: &str| {
            env(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let capacity = env_number(&non_empty_env, "PARLEY_MEMORY_WINDOW_CAPACITY")?
            .or(memory.window_capacity)
            .ok_or_else(|| missing("window_capacity"))?;
        let evict_count = env_number(&non_empty_env, "PARLEY_MEMORY_EVICT_COUNT")?
            .or(memory.evict_count)
            .ok_or_else(|| missing("evict_count"))?;
        let keep_tail = env_number(&non_empty_env, "PARLEY_MEMORY_KEEP_TAIL")?
            .or(memory.keep_tail)
            .unwrap_or(0);
        let idle_timeout_secs = env_number(&non_empty_env, "PARLEY_MEMORY_IDLE_TIMEOUT_SECS")?
            .or(memory.idle_timeout_secs)
            .ok_or_else(|| missing("idle_timeout_secs"))?;

        let mut config = Self::new(capacity, evict_count, Duration::from_secs(idle_timeout_secs))?
            .with_keep_tail(keep_tail)?
            .with_max_age(
                memory
                    .window_max_age_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            );

        config.backend = match non_empty_env("PARLEY_MEMORY_BACKEND").or(memory.backend.clone()) {
            Some(raw) => raw.parse()?,
            None => BackendMode::Auto,
        };
        config.valkey_url = non_empty_env("VALKEY_URL").or_else(|| {
            memory
                .valkey_url
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        });
        if config.backend == BackendMode::Valkey && config.valkey_url.is_none() {
            return Err(MemoryError::InvalidConfig(
                "memory backend `valkey` requires valkey_url or VALKEY_URL".to_string(),
            ));
        }
        if let Some(prefix) = non_empty_env("PARLEY_MEMORY_KEY_PREFIX").or_else(|| {
            memory
                .key_prefix
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }) {
            config.key_prefix = prefix;
        }

        let defaults = RetryPolicy::default();
        let attempts = memory.durable_attempts.unwrap_or(defaults.attempts);
        if attempts == 0 {
            return Err(MemoryError::InvalidConfig(
                "durable_attempts must be at least 1".to_string(),
            ));
        }
        config.retry = RetryPolicy {
            attempts,
            timeout: memory
                .durable_timeout_ms
                .filter(|ms| *ms > 0)
                .map_or(defaults.timeout, Duration::from_millis),
            backoff: memory
                .durable_backoff_ms
                .map_or(defaults.backoff, Duration::from_millis),
        };

        config.summary_async = match non_empty_env("PARLEY_MEMORY_SUMMARY_ASYNC") {
            Some(raw) => parse_bool("PARLEY_MEMORY_SUMMARY_ASYNC", &raw)?,
            None => memory.summary_async.unwrap_or(true),
        };
        config.summary_max_chars = memory
            .summary_max_chars
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SUMMARY_MAX_CHARS);
        config.summary_history_max = memory
            .summary_history_max
            .unwrap_or(DEFAULT_SUMMARY_HISTORY_MAX);
        config.idle_sweep_interval = memory
            .idle_sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(config)
    }
}

fn validate_bounds(capacity: usize, keep_tail: usize, evict_count: usize) -> Result<()> {
    if capacity == 0 {
        return Err(MemoryError::InvalidConfig(
            "window_capacity must be at least 1".to_string(),
        ));
    }
    if evict_count == 0 || evict_count > capacity {
        return Err(MemoryError::InvalidConfig(format!(
            "evict_count must be within 1..={capacity}, got {evict_count}"
        )));
    }
    if keep_tail >= capacity {
        return Err(MemoryError::InvalidConfig(format!(
            "keep_tail must be below window_capacity ({capacity}), got {keep_tail}"
        )));
    }
    Ok(())
}

fn missing(field: &str) -> MemoryError {
    MemoryError::InvalidConfig(format!("memory.{field} is required"))
}

fn env_number<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| MemoryError::InvalidConfig(format!("{name}={raw} is not a valid number"))),
        None => Ok(None),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MemoryError::InvalidConfig(format!(
            "{name}={raw} is not a boolean"
        ))),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
