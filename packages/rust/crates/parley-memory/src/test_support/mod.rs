//! Fault-injecting doubles for integration tests.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parley_window::TurnRecord;

use crate::durable::{DurableLog, MemoryDurableLog};
use crate::error::{StoreError, SummarizationError};
use crate::summary::{RuleSummarizer, Summarizer, Summary};

/// In-memory log that fails on demand.
#[derive(Default)]
pub struct FlakyDurableLog {
    inner: MemoryDurableLog,
    failing_writes: AtomicUsize,
    landing_failures: AtomicUsize,
    fail_reads: AtomicBool,
    write_calls: AtomicUsize,
}

impl FlakyDurableLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `n` write calls fail without persisting.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Next `n` write calls persist, then report a timeout.
    pub fn land_then_fail_next_writes(&self, n: usize) {
        self.landing_failures.store(n, Ordering::SeqCst);
    }

    /// Toggle failure of every read.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableLog for FlakyDurableLog {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn write(&self, turn: &TurnRecord) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        if Self::take_one(&self.landing_failures) {
            self.inner.write(turn).await?;
            return Err(StoreError::Timeout(0));
        }
        self.inner.write(turn).await
    }

    async fn read_range(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        self.check_reads()?;
        self.inner.read_range(session_id, from_sequence, limit).await
    }

    async fn last_sequence(&self, session_id: &str) -> Result<Option<u64>, StoreError> {
        self.check_reads()?;
        self.inner.last_sequence(session_id).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, StoreError> {
        self.inner.delete_session(session_id).await
    }
}

/// One recorded summarizer invocation.
#[derive(Debug, Clone)]
pub struct SummarizeCall {
    pub previous: Option<Summary>,
    pub turns: Vec<TurnRecord>,
}

/// Rule summarizer that records its inputs and fails on demand.
#[derive(Default)]
pub struct RecordingSummarizer {
    rule: RuleSummarizer,
    calls: StdMutex<Vec<SummarizeCall>>,
    failing: AtomicUsize,
    delay_ms: AtomicU64,
}

impl RecordingSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `n` calls fail (they are still recorded).
    pub fn fail_next(&self, n: usize) {
        self.failing.store(n, Ordering::SeqCst);
    }

    /// Every later call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            Ordering::SeqCst,
        );
    }

    pub fn calls(&self) -> Vec<SummarizeCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize(
        &self,
        previous: Option<&Summary>,
        turns: &[TurnRecord],
    ) -> Result<Summary, SummarizationError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SummarizeCall {
                previous: previous.cloned(),
                turns: turns.to_vec(),
            });
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if FlakyDurableLog::take_one(&self.failing) {
            return Err(SummarizationError::new("injected summarizer failure"));
        }
        self.rule.summarize(previous, turns).await
    }
}
