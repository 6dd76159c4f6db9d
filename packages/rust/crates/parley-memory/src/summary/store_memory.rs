use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Summary, SummaryStore};
use crate::error::StoreError;

struct SessionSummaries {
    current: Summary,
    history: VecDeque<Summary>,
}

/// In-process summary store.
pub struct MemorySummaryStore {
    sessions: DashMap<String, SessionSummaries>,
    history_max: usize,
}

impl MemorySummaryStore {
    #[must_use]
    pub fn new(history_max: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            history_max,
        }
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, session_id: &str) -> Result<Option<Summary>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| entry.current.clone()))
    }

    async fn save(&self, summary: &Summary) -> Result<(), StoreError> {
        match self.sessions.get_mut(&summary.session_id) {
            Some(mut entry) => {
                if summary.covered_up_to < entry.current.covered_up_to {
                    return Err(StoreError::Conflict {
                        session_id: summary.session_id.clone(),
                        sequence: summary.covered_up_to,
                    });
                }
                let prior = std::mem::replace(&mut entry.current, summary.clone());
                if self.history_max > 0 {
                    entry.history.push_back(prior);
                    while entry.history.len() > self.history_max {
                        entry.history.pop_front();
                    }
                }
            }
            None => {
                self.sessions.insert(
                    summary.session_id.clone(),
                    SessionSummaries {
                        current: summary.clone(),
                        history: VecDeque::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Summary>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| {
                let skip = entry.history.len().saturating_sub(limit);
                entry.history.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}
