use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::types::{SessionGate, SessionGateEntry, SessionGuard, SessionPermit};

impl SessionGate {
    /// Wait for exclusive access to `session_id`.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        // Permits are taken under the map lock so a releasing holder never
        // removes an entry that a new caller is about to wait on.
        let entry = {
            let mut guard = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = guard
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionGateEntry::default()))
                .clone();
            entry.permits.fetch_add(1, Ordering::AcqRel);
            entry
        };

        let permit = SessionPermit {
            session_id: session_id.to_string(),
            inner: Arc::clone(&self.inner),
            entry,
        };
        let lock_guard = permit.entry.lock.clone().lock_owned().await;
        SessionGuard {
            _lock_guard: lock_guard,
            _permit: permit,
        }
    }

    /// Sessions currently held or awaited.
    #[doc(hidden)]
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
