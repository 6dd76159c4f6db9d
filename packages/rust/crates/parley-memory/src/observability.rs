//! Structured event names attached to every `tracing` record as `event = ...`.

/// Memory-tier log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    BackendInitialized,
    ValkeyConnected,
    ValkeyCommandRetrySucceeded,
    ValkeyCommandRetryFailed,
    TurnAppended,
    TurnRolledBack,
    DurableCallRetried,
    DurableWriteFailed,
    DurableReadFailed,
    SequenceReloaded,
    SequenceCollision,
    WindowEvicted,
    WindowLoaded,
    WindowReconstructed,
    WindowReconstructDegraded,
    WindowGapFilled,
    WindowIdleExpired,
    SummaryQueued,
    SummaryUpdated,
    SummaryStale,
    SummaryRejected,
    SummarizerFailed,
    SessionCleared,
    HistoryLoaded,
    SettingsIgnored,
}

impl MemoryEvent {
    /// Stable dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackendInitialized => "memory.backend.initialized",
            Self::ValkeyConnected => "memory.valkey.connected",
            Self::ValkeyCommandRetrySucceeded => "memory.valkey.command.retry_succeeded",
            Self::ValkeyCommandRetryFailed => "memory.valkey.command.retry_failed",
            Self::TurnAppended => "memory.turn.appended",
            Self::TurnRolledBack => "memory.turn.rolled_back",
            Self::DurableCallRetried => "memory.durable.call.retried",
            Self::DurableWriteFailed => "memory.durable.write.failed",
            Self::DurableReadFailed => "memory.durable.read.failed",
            Self::SequenceReloaded => "memory.sequence.reloaded",
            Self::SequenceCollision => "memory.sequence.collision",
            Self::WindowEvicted => "memory.window.evicted",
            Self::WindowLoaded => "memory.window.loaded",
            Self::WindowReconstructed => "memory.window.reconstructed",
            Self::WindowReconstructDegraded => "memory.window.reconstruct_degraded",
            Self::WindowGapFilled => "memory.window.gap_filled",
            Self::WindowIdleExpired => "memory.window.idle_expired",
            Self::SummaryQueued => "memory.summary.queued",
            Self::SummaryUpdated => "memory.summary.updated",
            Self::SummaryStale => "memory.summary.stale",
            Self::SummaryRejected => "memory.summary.rejected",
            Self::SummarizerFailed => "memory.summary.summarizer_failed",
            Self::SessionCleared => "memory.session.cleared",
            Self::HistoryLoaded => "memory.history.loaded",
            Self::SettingsIgnored => "memory.settings.ignored",
        }
    }
}
