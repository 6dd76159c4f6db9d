//! Rolling session summaries: the record, its store and the summarizer seam.

mod store_memory;
mod store_valkey;
mod summarizer;

use async_trait::async_trait;
use parley_window::TurnRecord;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, SummarizationError};

pub use store_memory::MemorySummaryStore;
pub use store_valkey::ValkeySummaryStore;
pub use summarizer::{RuleSummarizer, summarise_evicted_turns};

/// Compressed representation of every turn up to `covered_up_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Conversation identifier.
    pub session_id: String,
    /// Highest sequence folded into this summary.
    pub covered_up_to: u64,
    /// Human-readable summary text.
    pub text: String,
    /// 1 for the first summary, +1 per re-summarization.
    pub version: u64,
    /// Turns folded in across all versions.
    #[serde(default)]
    pub turn_count: u64,
    /// Unix milliseconds when this version was produced.
    #[serde(default)]
    pub created_at_ms: u64,
}

/// Latest summary per session plus a bounded audit trail of prior versions.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;

    /// Current summary, `None` if the session has none.
    async fn load(&self, session_id: &str) -> Result<Option<Summary>, StoreError>;

    /// Replace the current summary, pushing the prior one into history.
    ///
    /// A save whose `covered_up_to` is below the stored one is rejected with
    /// `StoreError::Conflict`.
    async fn save(&self, summary: &Summary) -> Result<(), StoreError>;

    /// Up to `limit` prior versions, oldest first.
    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Summary>, StoreError>;

    /// Remove the summary and its history.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}

/// Folds evicted turns into the previous summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce the next summary. `turns` is non-empty and ascending by sequence.
    async fn summarize(
        &self,
        previous: Option<&Summary>,
        turns: &[TurnRecord],
    ) -> Result<Summary, SummarizationError>;
}
