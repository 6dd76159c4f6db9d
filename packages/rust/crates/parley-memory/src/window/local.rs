use async_trait::async_trait;
use dashmap::DashMap;
use parley_window::{SessionWindow, TurnRecord, WindowBounds};

use super::WindowBackend;
use crate::error::StoreError;
use crate::observability::MemoryEvent;

/// Process-local windows in a sharded map. Idle windows are dropped lazily
/// on access and by the sweeper.
pub struct LocalWindowBackend {
    windows: DashMap<String, SessionWindow>,
    bounds: WindowBounds,
    idle_timeout_ms: u64,
}

impl LocalWindowBackend {
    #[must_use]
    pub fn new(bounds: WindowBounds, idle_timeout_ms: u64) -> Self {
        Self {
            windows: DashMap::new(),
            bounds,
            idle_timeout_ms,
        }
    }

    fn expire_if_idle(&self, session_id: &str, now_ms: u64) {
        let idle_timeout_ms = self.idle_timeout_ms;
        if self
            .windows
            .remove_if(session_id, |_, window| window.is_idle(now_ms, idle_timeout_ms))
            .is_some()
        {
            tracing::debug!(
                event = MemoryEvent::WindowIdleExpired.as_str(),
                session_id,
                backend = "memory",
                "idle window dropped on access"
            );
        }
    }
}

#[async_trait]
impl WindowBackend for LocalWindowBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn load(
        &self,
        session_id: &str,
        now_ms: u64,
    ) -> Result<Option<Vec<TurnRecord>>, StoreError> {
        self.expire_if_idle(session_id, now_ms);
        Ok(self.windows.get_mut(session_id).map(|mut window| {
            window.touch(now_ms);
            window.snapshot()
        }))
    }

    async fn append(&self, turn: &TurnRecord, now_ms: u64) -> Result<usize, StoreError> {
        let mut window = self
            .windows
            .entry(turn.session_id.clone())
            .or_insert_with(|| SessionWindow::new(&turn.session_id, self.bounds, now_ms));
        window
            .push(turn.clone(), now_ms)
            .map_err(|rejected| StoreError::Conflict {
                session_id: rejected.session_id,
                sequence: rejected.sequence,
            })
    }

    async fn rollback(&self, session_id: &str, sequence: u64) -> Result<bool, StoreError> {
        Ok(self
            .windows
            .get_mut(session_id)
            .and_then(|mut window| window.pop_newest_if(sequence))
            .is_some())
    }

    async fn evict(&self, session_id: &str, now_ms: u64) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(self
            .windows
            .get_mut(session_id)
            .map(|mut window| window.evict(now_ms))
            .unwrap_or_default())
    }

    async fn reseed(
        &self,
        session_id: &str,
        turns: Vec<TurnRecord>,
        now_ms: u64,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        let mut window = SessionWindow::new(session_id, self.bounds, now_ms);
        let dropped = window.reseed(turns, now_ms);
        self.windows.insert(session_id.to_string(), window);
        Ok(dropped)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.windows.remove(session_id).is_some())
    }

    async fn idle_sessions(&self, now_ms: u64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .windows
            .iter()
            .filter(|entry| entry.value().is_idle(now_ms, self.idle_timeout_ms))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn remove_if_idle(&self, session_id: &str, now_ms: u64) -> Result<bool, StoreError> {
        let idle_timeout_ms = self.idle_timeout_ms;
        Ok(self
            .windows
            .remove_if(session_id, |_, window| window.is_idle(now_ms, idle_timeout_ms))
            .is_some())
    }

    async fn len(&self, session_id: &str, now_ms: u64) -> Result<Option<usize>, StoreError> {
        self.expire_if_idle(session_id, now_ms);
        Ok(self.windows.get(session_id).map(|window| window.len()))
    }
}
