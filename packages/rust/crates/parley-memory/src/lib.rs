//! Tiered conversation memory for dialogue services.
//!
//! - **Window**: bounded per-session recent turns (in-process or Valkey).
//! - **Durable log**: append-only record of every turn, the source of truth.
//! - **Summary**: rolling compression of turns evicted from the window.
//!
//! [`MemoryCoordinator`] is the only entry point; callers never touch the tiers directly.

#![allow(missing_docs)]

mod backends;
mod clock;
mod config;
mod coordinator;
mod durable;
mod error;
mod gate;
mod observability;
mod retry;
mod summary;
#[doc(hidden)]
pub mod test_support;
mod valkey;
mod window;

pub use backends::MemoryBackends;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BackendMode, DEFAULT_KEY_PREFIX, MemoryConfig, MemorySettings, RuntimeSettings,
    load_runtime_settings, load_runtime_settings_from_paths, runtime_settings_paths,
    set_config_home_override,
};
pub use coordinator::{ContextMessage, MemoryContext, MemoryCoordinator, SessionInfo};
pub use durable::{DurableLog, MemoryDurableLog, ValkeyDurableLog};
pub use error::{MemoryError, Result, StoreError, SummarizationError};
pub use gate::{SessionGate, SessionGuard};
pub use observability::MemoryEvent;
pub use parley_window::{Role, SessionWindow, TurnMetadata, TurnRecord, WindowBounds};
pub use retry::RetryPolicy;
pub use summary::{
    MemorySummaryStore, RuleSummarizer, Summarizer, Summary, SummaryStore, ValkeySummaryStore,
    summarise_evicted_turns,
};
pub use window::{LocalWindowBackend, ValkeyWindowBackend, WindowBackend};
