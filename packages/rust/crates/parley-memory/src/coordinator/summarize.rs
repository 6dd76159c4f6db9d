use parley_window::TurnRecord;

use super::{MemoryCoordinator, covered, validate_session};
use crate::error::{MemoryError, Result, StoreError};
use crate::observability::MemoryEvent;
use crate::summary::Summary;

impl MemoryCoordinator {
    /// Fold every pending evicted turn of the session into its summary now,
    /// after any in-flight run finishes. Returns the summary this call produced.
    ///
    /// # Errors
    /// Surfaces summarizer and store failures of this run. The pending turns are
    /// dropped either way; the log keeps them and the next run folds the gap.
    pub async fn settle(&self, session_id: &str) -> Result<Option<Summary>> {
        validate_session(session_id)?;
        self.summarize_pending(session_id).await
    }

    /// Queue evicted turns in eviction order. Caller holds the session gate.
    pub(super) fn queue_for_summary(&self, session_id: &str, turns: Vec<TurnRecord>) {
        let Some(last) = turns.last().map(|turn| turn.sequence) else {
            return;
        };
        let queued = turns.len();
        let pending = {
            let mut entry = self.inner.pending.entry(session_id.to_string()).or_default();
            entry.extend(turns);
            entry.len()
        };
        self.inner.queued_up_to.insert(session_id.to_string(), last);
        tracing::debug!(
            event = MemoryEvent::SummaryQueued.as_str(),
            session_id,
            queued,
            pending,
            last_sequence = last,
            "evicted turns queued for summarization"
        );
    }

    /// Run pending summarization on a spawned task, or inline when async is off.
    pub(super) async fn dispatch_summary(&self, session_id: &str) {
        if self.inner.config.summary_async {
            self.spawn_summary(session_id);
        } else {
            let _ = self.summarize_pending(session_id).await;
        }
    }

    /// Run pending summarization on a spawned task regardless of `summary_async`.
    /// Read paths use this so they never wait for the summarizer.
    pub(super) fn spawn_summary(&self, session_id: &str) {
        let coordinator = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let _ = coordinator.summarize_pending(&session_id).await;
        });
    }

    async fn summarize_pending(&self, session_id: &str) -> Result<Option<Summary>> {
        let _guard = self.inner.summary_gate.acquire(session_id).await;
        let Some((_, batch)) = self.inner.pending.remove(session_id) else {
            return Ok(None);
        };
        let handled_up_to = batch.last().map_or(0, |turn| turn.sequence);
        let result = self.fold_batch(session_id, batch).await;
        // Covered now, or failed and free to be reseeded from the log.
        self.inner
            .queued_up_to
            .remove_if(session_id, |_, queued| *queued <= handled_up_to);
        result
    }

    async fn fold_batch(
        &self,
        session_id: &str,
        mut batch: Vec<TurnRecord>,
    ) -> Result<Option<Summary>> {
        let summaries = &self.inner.backends.summaries;
        let Ok(previous) = self.load_summary(session_id).await else {
            return Err(self.skip_summary(
                session_id,
                &batch,
                "summary_load",
                "summary store unavailable",
            ));
        };
        let covered_up_to = covered(previous.as_ref());
        batch.retain(|turn| turn.sequence > covered_up_to);
        let Some(first) = batch.first().map(|turn| turn.sequence) else {
            return Ok(None);
        };

        // A failed earlier run leaves a hole between the summary and this batch.
        if first > covered_up_to + 1 {
            let missing = usize::try_from(first - covered_up_to - 1).unwrap_or(usize::MAX);
            let Ok(mut gap) = self.read_log(session_id, covered_up_to + 1, missing).await else {
                return Err(self.skip_summary(
                    session_id,
                    &batch,
                    "durable_read",
                    "gap read failed",
                ));
            };
            gap.retain(|turn| turn.sequence < first);
            tracing::debug!(
                event = MemoryEvent::WindowGapFilled.as_str(),
                session_id,
                from_sequence = covered_up_to + 1,
                gap = gap.len(),
                "summarizer batch extended with unsummarized log turns"
            );
            gap.append(&mut batch);
            batch = gap;
        }

        let mut next = match self
            .inner
            .summarizer
            .summarize(previous.as_ref(), &batch)
            .await
        {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(
                    event = MemoryEvent::SummarizerFailed.as_str(),
                    session_id,
                    turns = batch.len(),
                    covered_up_to,
                    error = %error,
                    "summarizer failed; summary left stale"
                );
                return Err(MemoryError::Summarization(error));
            }
        };
        next.session_id = session_id.to_string();
        next.covered_up_to = batch.last().map_or(covered_up_to, |turn| turn.sequence);
        next.version = previous.as_ref().map_or(1, |prev| prev.version + 1);
        next.created_at_ms = self.now_ms();

        let candidate = &next;
        let saved = self
            .inner
            .config
            .retry
            .run("summary_save", session_id, move || summaries.save(candidate))
            .await;
        if let Err(failure) = saved {
            let event = if matches!(failure.error, StoreError::Conflict { .. }) {
                MemoryEvent::SummaryRejected
            } else {
                MemoryEvent::SummaryStale
            };
            tracing::warn!(
                event = event.as_str(),
                session_id,
                covered_up_to = next.covered_up_to,
                version = next.version,
                attempts = failure.attempts,
                backend = summaries.backend_name(),
                error = %failure.error,
                "summary save failed"
            );
            return Err(failure.into_memory_error("summary_save", session_id));
        }
        tracing::info!(
            event = MemoryEvent::SummaryUpdated.as_str(),
            session_id,
            covered_up_to = next.covered_up_to,
            version = next.version,
            folded = batch.len(),
            backend = summaries.backend_name(),
            "summary updated"
        );
        Ok(Some(next))
    }

    fn skip_summary(
        &self,
        session_id: &str,
        batch: &[TurnRecord],
        operation: &'static str,
        message: &str,
    ) -> MemoryError {
        tracing::warn!(
            event = MemoryEvent::SummaryStale.as_str(),
            session_id,
            dropped = batch.len(),
            operation,
            "summarization skipped; turns stay in the durable log"
        );
        MemoryError::Persistence {
            operation,
            session_id: session_id.to_string(),
            attempts: self.inner.config.retry.attempts,
            message: message.to_string(),
        }
    }
}
