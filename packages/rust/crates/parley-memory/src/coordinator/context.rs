use parley_window::TurnRecord;
use serde::Serialize;

use super::{MemoryCoordinator, covered, validate_session};
use crate::error::Result;
use crate::observability::MemoryEvent;
use crate::summary::Summary;

/// What dialogue generation sees for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryContext {
    pub session_id: String,
    /// Latest summary, possibly lagging the window.
    pub summary: Option<Summary>,
    /// Recent turns, oldest first.
    pub turns: Vec<TurnRecord>,
    /// Set when a backend read failed and the result is best-effort.
    pub stale: bool,
}

/// Flat chat message rendered from a [`MemoryContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

impl MemoryContext {
    /// Whether there is neither a summary nor any turn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.turns.is_empty()
    }

    /// Summary as a leading system message, then the turns.
    #[must_use]
    pub fn to_messages(&self) -> Vec<ContextMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if let Some(summary) = self.summary.as_ref().filter(|s| !s.text.is_empty()) {
            messages.push(ContextMessage {
                role: "system".to_string(),
                content: format!("[Summary of earlier conversation: {}]", summary.text),
            });
        }
        messages.extend(self.turns.iter().map(|turn| ContextMessage {
            role: turn.role.to_string(),
            content: turn.text.clone(),
        }));
        messages
    }
}

pub(super) struct Reconstructed {
    pub(super) summary: Option<Summary>,
    /// First sequence read back; anything between the summary and this is in flight.
    pub(super) from_sequence: u64,
    pub(super) turns: Vec<TurnRecord>,
    pub(super) stale: bool,
    pub(super) summary_due: bool,
}

impl Reconstructed {
    fn degraded(summary: Option<Summary>) -> Self {
        Self {
            from_sequence: covered(summary.as_ref()) + 1,
            summary,
            turns: Vec::new(),
            stale: true,
            summary_due: false,
        }
    }
}

impl MemoryCoordinator {
    /// Summary plus recent turns. Never waits for the summarizer.
    ///
    /// Read failures degrade to a best-effort context with `stale = true`.
    ///
    /// # Errors
    /// `InvalidSession` for an empty id.
    pub async fn get_context(&self, session_id: &str) -> Result<MemoryContext> {
        validate_session(session_id)?;
        let guard = self.inner.gate.acquire(session_id).await;
        let now_ms = self.now_ms();
        let window = &self.inner.backends.window;

        let loaded = match window.load(session_id, now_ms).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::warn!(
                    event = MemoryEvent::WindowReconstructDegraded.as_str(),
                    session_id,
                    backend = window.backend_name(),
                    error = %error,
                    "window load failed; serving context from the durable log"
                );
                drop(guard);
                return Ok(self.context_from_log(session_id).await);
            }
        };

        let Some(window_turns) = loaded else {
            let rebuilt = self.reconstruct(session_id, now_ms).await;
            drop(guard);
            let covered_up_to = covered(rebuilt.summary.as_ref());
            let (turns, stale) = if !rebuilt.stale && rebuilt.from_sequence > covered_up_to + 1 {
                self.fill_gap(session_id, covered_up_to, rebuilt.turns).await
            } else {
                (rebuilt.turns, rebuilt.stale)
            };
            if rebuilt.summary_due {
                self.spawn_summary(session_id);
            }
            return Ok(MemoryContext {
                session_id: session_id.to_string(),
                summary: rebuilt.summary,
                turns,
                stale,
            });
        };
        tracing::debug!(
            event = MemoryEvent::WindowLoaded.as_str(),
            session_id,
            turns = window_turns.len(),
            backend = window.backend_name(),
            "window loaded"
        );

        let summary = match self.load_summary(session_id).await {
            Ok(summary) => summary,
            Err(()) => {
                return Ok(MemoryContext {
                    session_id: session_id.to_string(),
                    summary: None,
                    turns: window_turns,
                    stale: true,
                });
            }
        };
        drop(guard);

        let (turns, stale) = self
            .fill_gap(session_id, covered(summary.as_ref()), window_turns)
            .await;
        Ok(MemoryContext {
            session_id: session_id.to_string(),
            summary,
            turns,
            stale,
        })
    }

    /// Rebuild a cold window from the summary and the log tail after it.
    pub(super) async fn reconstruct(&self, session_id: &str, now_ms: u64) -> Reconstructed {
        let Ok(summary) = self.load_summary(session_id).await else {
            return Reconstructed::degraded(None);
        };
        // Turns already handed to the summarizer are not reseeded.
        let in_flight = self
            .inner
            .queued_up_to
            .get(session_id)
            .map_or(0, |entry| *entry);
        let from = covered(summary.as_ref()).max(in_flight) + 1;
        let Ok(turns) = self.read_log(session_id, from, usize::MAX).await else {
            return Reconstructed::degraded(summary);
        };
        if turns.is_empty() {
            return Reconstructed {
                summary,
                from_sequence: from,
                turns,
                stale: false,
                summary_due: false,
            };
        }

        let window = &self.inner.backends.window;
        let capacity = self.inner.config.bounds.capacity;
        let newest = turns[turns.len().saturating_sub(capacity)..].to_vec();
        let overflow = match window.reseed(session_id, turns, now_ms).await {
            Ok(overflow) => overflow,
            Err(error) => {
                tracing::warn!(
                    event = MemoryEvent::WindowReconstructDegraded.as_str(),
                    session_id,
                    backend = window.backend_name(),
                    error = %error,
                    "window reseed failed"
                );
                return Reconstructed {
                    summary,
                    from_sequence: from,
                    turns: newest,
                    stale: true,
                    summary_due: false,
                };
            }
        };
        tracing::debug!(
            event = MemoryEvent::WindowReconstructed.as_str(),
            session_id,
            from_sequence = from,
            reseeded = newest.len(),
            overflow = overflow.len(),
            backend = window.backend_name(),
            "cold window reconstructed"
        );
        let summary_due = !overflow.is_empty();
        if summary_due {
            self.queue_for_summary(session_id, overflow);
        }
        Reconstructed {
            summary,
            from_sequence: from,
            turns: newest,
            stale: false,
            summary_due,
        }
    }

    /// Prepend log turns the summary does not cover yet and the window no longer holds.
    async fn fill_gap(
        &self,
        session_id: &str,
        covered_up_to: u64,
        window_turns: Vec<TurnRecord>,
    ) -> (Vec<TurnRecord>, bool) {
        let from = covered_up_to + 1;
        let limit = match window_turns.first() {
            Some(first) if first.sequence > from => {
                usize::try_from(first.sequence - from).unwrap_or(usize::MAX)
            }
            Some(_) => return (window_turns, false),
            None => usize::MAX,
        };
        let Ok(mut gap) = self.read_log(session_id, from, limit).await else {
            return (window_turns, true);
        };
        if gap.is_empty() {
            return (window_turns, false);
        }
        tracing::debug!(
            event = MemoryEvent::WindowGapFilled.as_str(),
            session_id,
            from_sequence = from,
            gap = gap.len(),
            "summary lags window; gap filled from durable log"
        );
        gap.extend(window_turns);
        (gap, false)
    }

    /// Best-effort context straight from the stores, without touching the window.
    async fn context_from_log(&self, session_id: &str) -> MemoryContext {
        let summary = self.load_summary(session_id).await.unwrap_or(None);
        let from = covered(summary.as_ref()) + 1;
        let mut turns = self
            .read_log(session_id, from, usize::MAX)
            .await
            .unwrap_or_default();
        let overflow = turns
            .len()
            .saturating_sub(self.inner.config.bounds.capacity);
        turns.drain(..overflow);
        MemoryContext {
            session_id: session_id.to_string(),
            summary,
            turns,
            stale: true,
        }
    }

    /// Summary load under the retry budget. Failures are logged and reported as `Err(())`.
    pub(super) async fn load_summary(
        &self,
        session_id: &str,
    ) -> std::result::Result<Option<Summary>, ()> {
        let summaries = &self.inner.backends.summaries;
        self.inner
            .config
            .retry
            .run("summary_load", session_id, move || {
                summaries.load(session_id)
            })
            .await
            .map_err(|failure| {
                tracing::warn!(
                    event = MemoryEvent::SummaryStale.as_str(),
                    session_id,
                    attempts = failure.attempts,
                    backend = summaries.backend_name(),
                    error = %failure.error,
                    "summary load failed"
                );
            })
    }

    /// Log read under the retry budget. Failures are logged and reported as `Err(())`.
    pub(super) async fn read_log(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> std::result::Result<Vec<TurnRecord>, ()> {
        let log = &self.inner.backends.log;
        self.inner
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
                    "durable read failed"
                );
            })
    }
}
