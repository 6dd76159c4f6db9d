//! Backend selection: one window, log and summary store per coordinator.

use std::sync::Arc;

use crate::config::{BackendMode, MemoryConfig};
use crate::durable::{DurableLog, MemoryDurableLog, ValkeyDurableLog};
use crate::error::{MemoryError, Result};
use crate::observability::MemoryEvent;
use crate::summary::{MemorySummaryStore, SummaryStore, ValkeySummaryStore};
use crate::valkey::ValkeyConnection;
use crate::window::{LocalWindowBackend, ValkeyWindowBackend, WindowBackend};

/// Storage triple used by [`MemoryCoordinator`](crate::MemoryCoordinator).
#[derive(Clone)]
pub struct MemoryBackends {
    /// Active window store.
    pub window: Arc<dyn WindowBackend>,
    /// Append-only turn log.
    pub log: Arc<dyn DurableLog>,
    /// Summary store.
    pub summaries: Arc<dyn SummaryStore>,
}

impl MemoryBackends {
    /// In-process backends.
    #[must_use]
    pub fn in_memory(config: &MemoryConfig) -> Self {
        Self {
            window: Arc::new(LocalWindowBackend::new(
                config.bounds,
                config.idle_timeout_ms(),
            )),
            log: Arc::new(MemoryDurableLog::new()),
            summaries: Arc::new(MemorySummaryStore::new(config.summary_history_max)),
        }
    }

    /// Valkey backends sharing one multiplexed connection.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the URL cannot be parsed.
    pub fn valkey(config: &MemoryConfig, url: &str) -> Result<Self> {
        let conn = ValkeyConnection::open(url, &config.key_prefix)
            .map_err(|error| MemoryError::InvalidConfig(format!("{error:#}")))?;
        Ok(Self {
            window: Arc::new(ValkeyWindowBackend::new(
                conn.clone(),
                config.bounds,
                config.idle_timeout_ms(),
            )),
            log: Arc::new(ValkeyDurableLog::new(conn.clone())),
            summaries: Arc::new(ValkeySummaryStore::new(conn, config.summary_history_max)),
        })
    }

    /// Resolve `config.backend` (`auto` picks Valkey when a URL is set).
    ///
    /// # Errors
    /// Returns `InvalidConfig` for `valkey` without a URL or an unparsable URL.
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        let backends = match (config.backend, config.valkey_url.as_deref()) {
            (BackendMode::Memory, _) | (BackendMode::Auto, None) => Self::in_memory(config),
            (BackendMode::Valkey | BackendMode::Auto, Some(url)) => Self::valkey(config, url)?,
            (BackendMode::Valkey, None) => {
                return Err(MemoryError::InvalidConfig(
                    "memory backend `valkey` requires valkey_url or VALKEY_URL".to_string(),
                ));
            }
        };
        tracing::info!(
            event = MemoryEvent::BackendInitialized.as_str(),
            backend = backends.window.backend_name(),
            key_prefix = %config.key_prefix,
            capacity = config.bounds.capacity,
            evict_count = config.bounds.evict_count,
            keep_tail = config.bounds.keep_tail,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "memory backend initialized"
        );
        Ok(backends)
    }
}
