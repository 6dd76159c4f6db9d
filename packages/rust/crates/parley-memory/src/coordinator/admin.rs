use std::time::Duration;

use parley_window::TurnRecord;

use super::{MemoryCoordinator, SessionInfo, covered, validate_session};
use crate::error::{MemoryError, Result};
use crate::observability::MemoryEvent;
use crate::summary::Summary;

impl MemoryCoordinator {
    /// Delete window, summary, history and log for the session. Idempotent.
    ///
    /// # Errors
    /// `Persistence` when a backend delete fails; retrying is safe.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        validate_session(session_id)?;
        let _append_guard = self.inner.gate.acquire(session_id).await;
        let _summary_guard = self.inner.summary_gate.acquire(session_id).await;

        let dropped_pending = self
            .inner
            .pending
            .remove(session_id)
            .map_or(0, |(_, turns)| turns.len());
        self.inner.queued_up_to.remove(session_id);
        self.inner.sequences.remove(session_id);

        let window = &self.inner.backends.window;
        let had_window = window
            .remove(session_id)
            .await
            .map_err(|error| MemoryError::Persistence {
                operation: "window_remove",
                session_id: session_id.to_string(),
                attempts: 1,
                message: error.to_string(),
            })?;

        let retry = self.inner.config.retry;
        let summaries = &self.inner.backends.summaries;
        retry
            .run("summary_delete", session_id, move || {
                summaries.delete(session_id)
            })
            .await
            .map_err(|failure| failure.into_memory_error("summary_delete", session_id))?;

        let log = &self.inner.backends.log;
        let deleted = retry
            .run("durable_delete", session_id, move || {
                log.delete_session(session_id)
            })
            .await
            .map_err(|failure| failure.into_memory_error("durable_delete", session_id))?;

        tracing::info!(
            event = MemoryEvent::SessionCleared.as_str(),
            session_id,
            had_window,
            deleted_turns = deleted,
            dropped_pending,
            backend = window.backend_name(),
            "session memory cleared"
        );
        Ok(())
    }

    /// Newest `limit` turns from the durable log, oldest first.
    ///
    /// # Errors
    /// `Persistence` when the log cannot be read within the retry budget.
    pub async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<TurnRecord>> {
        validate_session(session_id)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let log = &self.inner.backends.log;
        let last = self
            .inner
            .config
            .retry
            .run("durable_last_sequence", session_id, move || {
                log.last_sequence(session_id)
            })
            .await
            .map_err(|failure| failure.into_memory_error("durable_last_sequence", session_id))?;
        let Some(last) = last else {
            return Ok(Vec::new());
        };
        let span = u64::try_from(limit).unwrap_or(u64::MAX);
        let from = last.saturating_sub(span) + 1;
        self.get_history_range(session_id, from, limit).await
    }

    /// Up to `limit` turns with `sequence >= from_sequence`, oldest first.
    ///
    /// # Errors
    /// `Persistence` when the log cannot be read within the retry budget.
    pub async fn get_history_range(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TurnRecord>> {
        validate_session(session_id)?;
        let log = &self.inner.backends.log;
        let turns = self
            .inner
            .config
            .retry
            .run("durable_read", session_id, move || {
                log.read_range(session_id, from_sequence, limit)
            })
            .await
            .map_err(|failure| {
                tracing::warn!(
                    event = MemoryEvent::DurableReadFailed.as_str(),
                    session_id,
                    from_sequence,
                    attempts = failure.attempts,
                    backend = log.backend_name(),
                    error = %failure.error,
                    "history read failed"
                );
                failure.into_memory_error("durable_read", session_id)
            })?;
        tracing::debug!(
            event = MemoryEvent::HistoryLoaded.as_str(),
            session_id,
            from_sequence,
            turns = turns.len(),
            backend = log.backend_name(),
            "history loaded"
        );
        Ok(turns)
    }

    /// Prior summary versions, oldest first.
    ///
    /// # Errors
    /// `Persistence` when the summary store cannot be read.
    pub async fn summary_history(&self, session_id: &str, limit: usize) -> Result<Vec<Summary>> {
        validate_session(session_id)?;
        let summaries = &self.inner.backends.summaries;
        self.inner
            .config
            .retry
            .run("summary_history", session_id, move || {
                summaries.history(session_id, limit)
            })
            .await
            .map_err(|failure| failure.into_memory_error("summary_history", session_id))
    }

    /// Snapshot of window, log and summary state. Does not refresh idle time.
    ///
    /// # Errors
    /// `Persistence` when a backend read fails.
    pub async fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        validate_session(session_id)?;
        let now_ms = self.now_ms();
        let window = &self.inner.backends.window;
        let window_len = window
            .len(session_id, now_ms)
            .await
            .map_err(|error| MemoryError::Persistence {
                operation: "window_len",
                session_id: session_id.to_string(),
                attempts: 1,
                message: error.to_string(),
            })?;

        let retry = self.inner.config.retry;
        let log = &self.inner.backends.log;
        let last_sequence = retry
            .run("durable_last_sequence", session_id, move || {
                log.last_sequence(session_id)
            })
            .await
            .map_err(|failure| failure.into_memory_error("durable_last_sequence", session_id))?;
        let summaries = &self.inner.backends.summaries;
        let summary = retry
            .run("summary_load", session_id, move || {
                summaries.load(session_id)
            })
            .await
            .map_err(|failure| failure.into_memory_error("summary_load", session_id))?;

        Ok(SessionInfo {
            session_id: session_id.to_string(),
            backend: window.backend_name(),
            warm: window_len.is_some(),
            window_len: window_len.unwrap_or(0),
            last_sequence,
            summary_version: summary.as_ref().map(|summary| summary.version),
            covered_up_to: covered(summary.as_ref()),
            pending_summary_turns: self
                .inner
                .pending
                .get(session_id)
                .map_or(0, |pending| pending.len()),
        })
    }

    /// Drop every window idle past the timeout. Summaries and logs are kept.
    /// Returns how many windows were dropped.
    ///
    /// # Errors
    /// `Persistence` when the window backend cannot be scanned.
    pub async fn expire_idle_sessions(&self) -> Result<usize> {
        let window = &self.inner.backends.window;
        let idle = window
            .idle_sessions(self.now_ms())
            .await
            .map_err(|error| MemoryError::Persistence {
                operation: "window_idle_scan",
                session_id: String::new(),
                attempts: 1,
                message: error.to_string(),
            })?;

        let mut expired = 0;
        for session_id in idle {
            let _guard = self.inner.gate.acquire(&session_id).await;
            match window.remove_if_idle(&session_id, self.now_ms()).await {
                Ok(true) => {
                    self.inner.sequences.remove(&session_id);
                    expired += 1;
                    tracing::debug!(
                        event = MemoryEvent::WindowIdleExpired.as_str(),
                        session_id = %session_id,
                        backend = window.backend_name(),
                        "idle window dropped"
                    );
                }
                Ok(false) => {}
                Err(error) => tracing::warn!(
                    event = MemoryEvent::WindowIdleExpired.as_str(),
                    session_id = %session_id,
                    backend = window.backend_name(),
                    error = %error,
                    "idle window removal failed"
                ),
            }
        }
        self.forget_cold_sessions().await;
        Ok(expired)
    }

    /// Drop sequence counters of sessions whose window is gone, whether the
    /// sweeper, lazy expiry on access, or a backend TTL removed it.
    async fn forget_cold_sessions(&self) {
        let window = &self.inner.backends.window;
        let tracked: Vec<String> = self
            .inner
            .sequences
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for session_id in tracked {
            let _guard = self.inner.gate.acquire(&session_id).await;
            if let Ok(None) = window.len(&session_id, self.now_ms()).await {
                self.inner.sequences.remove(&session_id);
            }
        }
    }

    /// Per-session entries held in memory: `(sequences, pending, queued)`.
    #[doc(hidden)]
    #[must_use]
    pub fn tracked_sessions(&self) -> (usize, usize, usize) {
        (
            self.inner.sequences.len(),
            self.inner.pending.len(),
            self.inner.queued_up_to.len(),
        )
    }

    /// Run [`Self::expire_idle_sessions`] every `interval` until the handle is aborted.
    #[must_use]
    pub fn spawn_idle_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = coordinator.expire_idle_sessions().await {
                    tracing::warn!(
                        event = MemoryEvent::WindowIdleExpired.as_str(),
                        error = %error,
                        "idle sweep failed"
                    );
                }
            }
        })
    }
}
