#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use parley_memory::SessionGate;

#[tokio::test]
async fn same_session_is_serialized_and_entry_released() -> Result<()> {
    let gate = SessionGate::default();
    let guard = gate.acquire("a").await;
    assert_eq!(gate.active_sessions(), 1);

    let waiter_gate = gate.clone();
    let waiter = tokio::spawn(async move {
        let _guard = waiter_gate.acquire("a").await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let other = tokio::time::timeout(Duration::from_millis(100), gate.acquire("b")).await?;
    assert_eq!(gate.active_sessions(), 2);

    drop(guard);
    waiter.await?;
    drop(other);
    assert_eq!(gate.active_sessions(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn holders_never_overlap() -> Result<()> {
    let gate = SessionGate::default();
    let inside = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let gate = gate.clone();
        let inside = Arc::clone(&inside);
        handles.push(tokio::spawn(async move {
            let _guard = gate.acquire("shared").await;
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
            tokio::time::sleep(Duration::from_millis(2)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await?;
    }
    assert_eq!(gate.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_waiter_releases_its_entry() -> Result<()> {
    let gate = SessionGate::default();
    let guard = gate.acquire("c").await;
    let waiting = tokio::time::timeout(Duration::from_millis(10), gate.acquire("c")).await;
    assert!(waiting.is_err());
    drop(guard);
    assert_eq!(gate.active_sessions(), 0);
    Ok(())
}
