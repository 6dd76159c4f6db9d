//! `MemoryCoordinator`: the single entry point that keeps window, log and
//! summary consistent per session.
//!
//! - `append` assigns sequences, writes window then log (all-or-nothing) and evicts.
//! - `get_context` serves summary + window, reconstructing cold sessions from the log.
//! - Summarization runs per session behind its own gate, fed by a pending queue.

mod admin;
mod append;
mod context;
mod summarize;

use std::sync::Arc;

use dashmap::DashMap;
use parley_window::TurnRecord;
use serde::Serialize;

use crate::backends::MemoryBackends;
use crate::clock::{Clock, SystemClock};
use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::gate::SessionGate;
use crate::summary::{RuleSummarizer, Summarizer, Summary};

pub use context::{ContextMessage, MemoryContext};

/// Point-in-time view of one session's memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub backend: &'static str,
    /// Whether a window is currently held (not idle-expired).
    pub warm: bool,
    pub window_len: usize,
    pub last_sequence: Option<u64>,
    pub summary_version: Option<u64>,
    pub covered_up_to: u64,
    /// Evicted turns waiting for the summarizer.
    pub pending_summary_turns: usize,
}

/// Tiered conversation memory. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: MemoryConfig,
    backends: MemoryBackends,
    summarizer: Arc<dyn Summarizer>,
    clock: Arc<dyn Clock>,
    gate: SessionGate,
    summary_gate: SessionGate,
    sequences: DashMap<String, u64>,
    pending: DashMap<String, Vec<TurnRecord>>,
    queued_up_to: DashMap<String, u64>,
}

impl MemoryCoordinator {
    /// Coordinator on the system clock.
    #[must_use]
    pub fn new(
        config: MemoryConfig,
        backends: MemoryBackends,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self::with_clock(config, backends, summarizer, Arc::new(SystemClock))
    }

    /// Coordinator with an explicit clock.
    #[must_use]
    pub fn with_clock(
        config: MemoryConfig,
        backends: MemoryBackends,
        summarizer: Arc<dyn Summarizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                backends,
                summarizer,
                clock,
                gate: SessionGate::default(),
                summary_gate: SessionGate::default(),
                sequences: DashMap::new(),
                pending: DashMap::new(),
                queued_up_to: DashMap::new(),
            }),
        }
    }

    /// Backends picked from `config.backend`, rule summarizer, system clock.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the configured backend cannot be built.
    pub fn from_config(config: MemoryConfig) -> Result<Self> {
        let backends = MemoryBackends::from_config(&config)?;
        let summarizer = Arc::new(RuleSummarizer::new(config.summary_max_chars));
        Ok(Self::new(config, backends, summarizer))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Window backend label.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.inner.backends.window.backend_name()
    }

    fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }
}

fn validate_session(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(MemoryError::InvalidSession);
    }
    Ok(())
}

fn covered(summary: Option<&Summary>) -> u64 {
    summary.map_or(0, |summary| summary.covered_up_to)
}
