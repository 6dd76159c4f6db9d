//! Append-only per-session turn log.

mod memory;
mod valkey;

use async_trait::async_trait;
use parley_window::TurnRecord;

use crate::error::StoreError;

pub use memory::MemoryDurableLog;
pub use valkey::ValkeyDurableLog;

/// Durable, append-only record of every turn.
///
/// Writing an identical record twice is a no-op; a different record at an
/// existing sequence is `StoreError::Conflict`.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;

    /// Persist one turn.
    async fn write(&self, turn: &TurnRecord) -> Result<(), StoreError>;

    /// Up to `limit` turns with `sequence >= from_sequence`, ascending.
    async fn read_range(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, StoreError>;

    /// Highest written sequence, `None` for an unknown session.
    async fn last_sequence(&self, session_id: &str) -> Result<Option<u64>, StoreError>;

    /// Drop every turn of the session. Returns how many were removed.
    async fn delete_session(&self, session_id: &str) -> Result<usize, StoreError>;
}
