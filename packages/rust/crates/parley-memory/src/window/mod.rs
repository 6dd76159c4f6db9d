//! Active window backends.

mod local;
mod valkey;

use async_trait::async_trait;
use parley_window::TurnRecord;

use crate::error::StoreError;

pub use local::LocalWindowBackend;
pub use valkey::ValkeyWindowBackend;

/// Per-session bounded window store.
///
/// `None`/`Ok(false)` mean "no warm window"; `Err` means the backend failed.
#[async_trait]
pub trait WindowBackend: Send + Sync {
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;

    /// Window contents, oldest first, refreshing the idle clock. `None` when cold.
    async fn load(&self, session_id: &str, now_ms: u64)
    -> Result<Option<Vec<TurnRecord>>, StoreError>;

    /// Append one turn, creating the window if needed. Returns the new length.
    async fn append(&self, turn: &TurnRecord, now_ms: u64) -> Result<usize, StoreError>;

    /// Pop the newest turn if it carries `sequence`.
    async fn rollback(&self, session_id: &str, sequence: u64) -> Result<bool, StoreError>;

    /// Apply count and age bounds; returns drained turns, oldest first.
    async fn evict(&self, session_id: &str, now_ms: u64) -> Result<Vec<TurnRecord>, StoreError>;

    /// Replace the window with the newest `capacity` of `turns`; returns the rest.
    async fn reseed(
        &self,
        session_id: &str,
        turns: Vec<TurnRecord>,
        now_ms: u64,
    ) -> Result<Vec<TurnRecord>, StoreError>;

    /// Drop the window. Returns whether one existed.
    async fn remove(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Sessions whose window went idle. Backends with server-side expiry return none.
    async fn idle_sessions(&self, now_ms: u64) -> Result<Vec<String>, StoreError>;

    /// Drop the window only if still idle.
    async fn remove_if_idle(&self, session_id: &str, now_ms: u64) -> Result<bool, StoreError>;

    /// Window length without touching it. `None` when cold.
    async fn len(&self, session_id: &str, now_ms: u64) -> Result<Option<usize>, StoreError>;
}
