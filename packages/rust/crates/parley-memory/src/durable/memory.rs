use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parley_window::TurnRecord;

use super::DurableLog;
use crate::error::StoreError;

/// In-process log keyed by session, ordered by sequence.
#[derive(Default)]
pub struct MemoryDurableLog {
    sessions: DashMap<String, BTreeMap<u64, TurnRecord>>,
}

impl MemoryDurableLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableLog for MemoryDurableLog {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, turn: &TurnRecord) -> Result<(), StoreError> {
        let mut log = self.sessions.entry(turn.session_id.clone()).or_default();
        match log.get(&turn.sequence) {
            Some(existing) if existing == turn => Ok(()),
            Some(_) => Err(StoreError::Conflict {
                session_id: turn.session_id.clone(),
                sequence: turn.sequence,
            }),
            None => {
                log.insert(turn.sequence, turn.clone());
                Ok(())
            }
        }
    }

    async fn read_range(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|log| {
                log.range(from_sequence..)
                    .take(limit)
                    .map(|(_, turn)| turn.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_sequence(&self, session_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|log| log.keys().next_back().copied()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .sessions
            .remove(session_id)
            .map_or(0, |(_, log)| log.len()))
    }
}
