use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicUsize;

use tokio::sync::{Mutex, OwnedMutexGuard};

pub(super) type GateMap = Arc<StdMutex<HashMap<String, Arc<SessionGateEntry>>>>;

/// Map of refcounted per-session async mutexes.
///
/// Entries live only while some caller holds or waits on them.
#[derive(Clone, Default)]
pub struct SessionGate {
    pub(super) inner: GateMap,
}

#[derive(Default)]
pub(super) struct SessionGateEntry {
    pub(super) lock: Arc<Mutex<()>>,
    pub(super) permits: AtomicUsize,
}

/// Exclusive hold on one session; released on drop.
pub struct SessionGuard {
    pub(super) _lock_guard: OwnedMutexGuard<()>,
    pub(super) _permit: SessionPermit,
}

pub(super) struct SessionPermit {
    pub(super) session_id: String,
    pub(super) inner: GateMap,
    pub(super) entry: Arc<SessionGateEntry>,
}
