//! Session window: bounded ring buffer of `TurnRecord`s.

use std::collections::VecDeque;

use thiserror::Error;

use crate::TurnRecord;

/// Count and age bounds for one session window.
///
/// Eviction triggers once the window holds more than `capacity - keep_tail` turns.
/// At least `evict_count` turns leave per trigger, more when needed to get back
/// under `capacity`. With `max_age_ms` set, turns older than the cutoff leave too.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBounds {
    /// Maximum turns kept in the window.
    pub capacity: usize,
    /// Low-water offset below `capacity` at which eviction starts.
    pub keep_tail: usize,
    /// Minimum turns evicted per trigger.
    pub evict_count: usize,
    /// Optional maximum turn age in milliseconds.
    pub max_age_ms: Option<u64>,
}

impl WindowBounds {
    /// Build bounds, clamping to a usable shape (`capacity >= 1`,
    /// `keep_tail < capacity`, `1 <= evict_count <= capacity`).
    #[must_use]
    pub fn new(capacity: usize, keep_tail: usize, evict_count: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            keep_tail: keep_tail.min(capacity - 1),
            evict_count: evict_count.clamp(1, capacity),
            max_age_ms: None,
        }
    }

    /// Add an age bound. Zero disables it.
    #[must_use]
    pub fn with_max_age_ms(mut self, max_age_ms: Option<u64>) -> Self {
        self.max_age_ms = max_age_ms.filter(|ms| *ms > 0);
        self
    }

    /// Window length above which eviction triggers.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.capacity - self.keep_tail
    }

    /// Turns to evict by count for a window of `len` turns.
    #[must_use]
    pub fn overflow(&self, len: usize) -> usize {
        if len <= self.high_water() {
            return 0;
        }
        self.evict_count
            .max(len.saturating_sub(self.capacity))
            .min(len)
    }

    /// Turns stamped before this instant are past the age bound.
    #[must_use]
    pub fn age_cutoff_ms(&self, now_ms: u64) -> Option<u64> {
        self.max_age_ms.map(|max_age| now_ms.saturating_sub(max_age))
    }
}

/// Push rejected because the turn does not extend the window's sequence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("turn {sequence} does not follow {last_sequence} in session window {session_id}")]
pub struct OutOfOrderTurn {
    /// Session the window belongs to.
    pub session_id: String,
    /// Highest sequence already in the window.
    pub last_sequence: u64,
    /// Rejected sequence.
    pub sequence: u64,
}

/// Bounded session window for recent turns. O(1) append, oldest turns drained on eviction.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    session_id: String,
    ring: VecDeque<TurnRecord>,
    bounds: WindowBounds,
    last_access_ms: u64,
}

impl SessionWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new(session_id: &str, bounds: WindowBounds, now_ms: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            ring: VecDeque::with_capacity(bounds.capacity.saturating_add(1).min(4096)),
            bounds,
            last_access_ms: now_ms,
        }
    }

    /// Append one turn and refresh the access time. Returns the new length.
    ///
    /// The window may temporarily exceed its bounds; call [`Self::evict`] afterwards.
    pub fn push(&mut self, turn: TurnRecord, now_ms: u64) -> Result<usize, OutOfOrderTurn> {
        if let Some(last) = self.last_sequence()
            && turn.sequence <= last
        {
            return Err(OutOfOrderTurn {
                session_id: self.session_id.clone(),
                last_sequence: last,
                sequence: turn.sequence,
            });
        }
        self.ring.push_back(turn);
        self.last_access_ms = now_ms;
        Ok(self.ring.len())
    }

    /// Remove the newest turn only if it carries `sequence`.
    pub fn pop_newest_if(&mut self, sequence: u64) -> Option<TurnRecord> {
        if self.ring.back().is_some_and(|turn| turn.sequence == sequence) {
            return self.ring.pop_back();
        }
        None
    }

    /// Drain every turn past the count or age bound, oldest first.
    pub fn evict(&mut self, now_ms: u64) -> Vec<TurnRecord> {
        let mut take = self.bounds.overflow(self.ring.len());
        if let Some(cutoff) = self.bounds.age_cutoff_ms(now_ms) {
            take += self
                .ring
                .iter()
                .skip(take)
                .take_while(|turn| turn.timestamp_ms < cutoff)
                .count();
        }
        self.drain_oldest(take)
    }

    /// Drain the oldest `n` turns.
    pub fn drain_oldest(&mut self, n: usize) -> Vec<TurnRecord> {
        let take = n.min(self.ring.len());
        self.ring.drain(..take).collect()
    }

    /// Replace contents with the newest `capacity` of `turns` (ascending order expected).
    /// Returns the older turns that did not fit.
    pub fn reseed(&mut self, mut turns: Vec<TurnRecord>, now_ms: u64) -> Vec<TurnRecord> {
        let overflow = turns.len().saturating_sub(self.bounds.capacity);
        let kept = turns.split_off(overflow);
        self.ring = kept.into();
        self.last_access_ms = now_ms;
        turns
    }

    /// Owned copy of every turn, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TurnRecord> {
        self.ring.iter().cloned().collect()
    }

    /// Turns in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the window holds no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Sequence of the oldest turn.
    #[must_use]
    pub fn first_sequence(&self) -> Option<u64> {
        self.ring.front().map(|turn| turn.sequence)
    }

    /// Sequence of the newest turn.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.ring.back().map(|turn| turn.sequence)
    }

    /// Refresh the idle clock.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_access_ms = now_ms;
    }

    /// Last append/read time.
    #[must_use]
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms
    }

    /// Whether the window went `idle_timeout_ms` without access.
    #[must_use]
    pub fn is_idle(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_access_ms) >= idle_timeout_ms
    }

    /// Session identifier for this window.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
