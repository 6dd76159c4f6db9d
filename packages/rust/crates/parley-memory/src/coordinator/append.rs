use parley_window::{Role, TurnMetadata, TurnRecord};

use super::{MemoryCoordinator, validate_session};
use crate::error::{MemoryError, Result, StoreError};
use crate::observability::MemoryEvent;

impl MemoryCoordinator {
    /// Record one turn. The turn is either in both window and log, or in neither.
    ///
    /// # Errors
    /// - `InvalidSession` for an empty id.
    /// - `Persistence` when the window or the durable log cannot confirm the write.
    /// - `ConcurrencyViolation` when the sequence is already taken.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        metadata: TurnMetadata,
    ) -> Result<TurnRecord> {
        validate_session(session_id)?;
        let guard = self.inner.gate.acquire(session_id).await;
        let now_ms = self.now_ms();
        let window = &self.inner.backends.window;

        let warm = window
            .len(session_id, now_ms)
            .await
            .map_err(|error| window_error("window_len", session_id, &error))?;
        let mut summary_due = false;
        if warm.is_none() {
            summary_due = self.reconstruct(session_id, now_ms).await.summary_due;
        }

        let sequence = self.next_sequence(session_id).await?;
        let turn = TurnRecord::new(session_id, sequence, role, text, now_ms).with_metadata(metadata);

        if let Err(error) = window.append(&turn, now_ms).await {
            self.inner.sequences.remove(session_id);
            return Err(match error {
                StoreError::Conflict { .. } => {
                    tracing::error!(
                        event = MemoryEvent::SequenceCollision.as_str(),
                        session_id,
                        sequence,
                        backend = window.backend_name(),
                        "window rejected sequence"
                    );
                    MemoryError::ConcurrencyViolation {
                        session_id: session_id.to_string(),
                        sequence,
                        detail: "window already holds this or a later sequence".to_string(),
                    }
                }
                error => window_error("window_append", session_id, &error),
            });
        }

        if let Err(error) = self.write_durable(&turn).await {
            self.rollback_window(&turn).await;
            return Err(error);
        }
        self.inner.sequences.insert(session_id.to_string(), sequence);
        tracing::debug!(
            event = MemoryEvent::TurnAppended.as_str(),
            session_id,
            sequence,
            role = %role,
            backend = window.backend_name(),
            "turn appended"
        );

        match window.evict(session_id, now_ms).await {
            Ok(evicted) if !evicted.is_empty() => {
                tracing::debug!(
                    event = MemoryEvent::WindowEvicted.as_str(),
                    session_id,
                    evicted = evicted.len(),
                    first_sequence = evicted.first().map(|turn| turn.sequence),
                    last_sequence = evicted.last().map(|turn| turn.sequence),
                    backend = window.backend_name(),
                    "window evicted oldest turns"
                );
                self.queue_for_summary(session_id, evicted);
                summary_due = true;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    event = MemoryEvent::WindowEvicted.as_str(),
                    session_id,
                    backend = window.backend_name(),
                    error = %error,
                    "window eviction failed; bounds applied on next append"
                );
            }
        }
        drop(guard);

        if summary_due {
            self.dispatch_summary(session_id).await;
        }
        Ok(turn)
    }

    async fn next_sequence(&self, session_id: &str) -> Result<u64> {
        if let Some(last) = self.inner.sequences.get(session_id).map(|entry| *entry) {
            return Ok(last + 1);
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
            .map_err(|failure| failure.into_memory_error("durable_last_sequence", session_id))?
            .unwrap_or(0);
        tracing::debug!(
            event = MemoryEvent::SequenceReloaded.as_str(),
            session_id,
            last_sequence = last,
            backend = log.backend_name(),
            "sequence counter loaded from durable log"
        );
        Ok(last + 1)
    }

    async fn write_durable(&self, turn: &TurnRecord) -> Result<()> {
        let log = &self.inner.backends.log;
        let session_id = turn.session_id.as_str();
        self.inner
            .config
            .retry
            .run("durable_write", session_id, move || log.write(turn))
            .await
            .map_err(|failure| {
                let conflict = matches!(failure.error, StoreError::Conflict { .. });
                if conflict {
                    tracing::error!(
                        event = MemoryEvent::SequenceCollision.as_str(),
                        session_id,
                        sequence = turn.sequence,
                        backend = log.backend_name(),
                        "durable log holds a different record at this sequence"
                    );
                } else {
                    tracing::warn!(
                        event = MemoryEvent::DurableWriteFailed.as_str(),
                        session_id,
                        sequence = turn.sequence,
                        attempts = failure.attempts,
                        backend = log.backend_name(),
                        error = %failure.error,
                        "durable write not confirmed; rolling back"
                    );
                }
                failure.into_memory_error("durable_write", session_id)
            })
    }

    async fn rollback_window(&self, turn: &TurnRecord) {
        let session_id = turn.session_id.as_str();
        // The write may have landed; reload the counter from the log next time.
        self.inner.sequences.remove(session_id);
        let window = &self.inner.backends.window;
        match window.rollback(session_id, turn.sequence).await {
            Ok(removed) => tracing::debug!(
                event = MemoryEvent::TurnRolledBack.as_str(),
                session_id,
                sequence = turn.sequence,
                removed,
                backend = window.backend_name(),
                "window write rolled back"
            ),
            Err(error) => {
                // The window must never show a turn the log did not confirm.
                tracing::error!(
                    event = MemoryEvent::TurnRolledBack.as_str(),
                    session_id,
                    sequence = turn.sequence,
                    backend = window.backend_name(),
                    error = %error,
                    "window rollback failed; discarding window"
                );
                if let Err(error) = window.remove(session_id).await {
                    tracing::error!(
                        event = MemoryEvent::TurnRolledBack.as_str(),
                        session_id,
                        backend = window.backend_name(),
                        error = %error,
                        "window discard failed"
                    );
                }
            }
        }
    }
}

fn window_error(operation: &'static str, session_id: &str, error: &StoreError) -> MemoryError {
    MemoryError::Persistence {
        operation,
        session_id: session_id.to_string(),
        attempts: 1,
        message: error.to_string(),
    }
}
