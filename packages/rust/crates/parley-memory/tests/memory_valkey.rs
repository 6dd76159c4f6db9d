#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use parley_memory::{
    MemoryBackends, MemoryConfig, MemoryCoordinator, Role, RuleSummarizer, StoreError,
    TurnMetadata, TurnRecord,
};

fn unique_id(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn live_valkey_url() -> Option<String> {
    std::env::var("VALKEY_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

fn config(key_prefix: &str) -> Result<MemoryConfig> {
    let mut config = MemoryConfig::new(3, 2, Duration::from_secs(60))?.with_summary_async(false);
    config.key_prefix = key_prefix.to_string();
    Ok(config)
}

fn build(url: &str, key_prefix: &str) -> Result<(MemoryCoordinator, MemoryBackends)> {
    let config = config(key_prefix)?;
    let backends = MemoryBackends::valkey(&config, url)?;
    let memory = MemoryCoordinator::new(
        config,
        backends.clone(),
        Arc::new(RuleSummarizer::new(480)),
    );
    Ok((memory, backends))
}

#[tokio::test]
#[ignore = "requires live valkey server"]
async fn context_is_shared_across_coordinator_instances() -> Result<()> {
    let Some(url) = live_valkey_url() else {
        eprintln!("skip: set VALKEY_URL");
        return Ok(());
    };
    let key_prefix = unique_id("parley-cross-instance");
    let session_id = unique_id("session");
    let (memory_a, _) = build(&url, &key_prefix)?;
    let (memory_b, _) = build(&url, &key_prefix)?;

    for text in ["one", "two", "three", "four"] {
        memory_a
            .append(&session_id, Role::User, text, TurnMetadata::new())
            .await?;
    }
    memory_a.settle(&session_id).await?;

    let context = memory_b.get_context(&session_id).await?;
    assert!(!context.stale);
    let summary = context.summary.expect("summary shared through valkey");
    assert_eq!(summary.covered_up_to, 2);
    let sequences: Vec<u64> = context.turns.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, vec![3, 4]);

    // The second instance continues the sequence from the shared log.
    let next = memory_b
        .append(&session_id, Role::Agent, "five", TurnMetadata::new())
        .await?;
    assert_eq!(next.sequence, 5);

    memory_a.clear(&session_id).await?;
    assert!(memory_b.get_context(&session_id).await?.is_empty());
    assert!(memory_b.get_history(&session_id, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires live valkey server"]
async fn durable_log_rejects_conflicting_rewrite() -> Result<()> {
    let Some(url) = live_valkey_url() else {
        eprintln!("skip: set VALKEY_URL");
        return Ok(());
    };
    let key_prefix = unique_id("parley-log-conflict");
    let session_id = unique_id("session");
    let (_, backends) = build(&url, &key_prefix)?;

    let turn = TurnRecord::new(&session_id, 1, Role::User, "hello", 1_000);
    backends.log.write(&turn).await?;
    // Identical rewrite is a no-op.
    backends.log.write(&turn).await?;

    let other = TurnRecord::new(&session_id, 1, Role::User, "bye", 1_000);
    let error = backends.log.write(&other).await.expect_err("conflict");
    assert!(matches!(error, StoreError::Conflict { sequence: 1, .. }));

    assert_eq!(backends.log.last_sequence(&session_id).await?, Some(1));
    let stored = backends.log.read_range(&session_id, 1, 10).await?;
    assert_eq!(stored, vec![turn]);
    assert_eq!(backends.log.delete_session(&session_id).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires live valkey server"]
async fn sessions_share_one_connection_in_parallel() -> Result<()> {
    let Some(url) = live_valkey_url() else {
        eprintln!("skip: set VALKEY_URL");
        return Ok(());
    };
    let key_prefix = unique_id("parley-parallel");
    let (memory, _) = build(&url, &key_prefix)?;

    let mut handles = Vec::new();
    for i in 0..16 {
        let memory = memory.clone();
        let session_id = format!("{key_prefix}-session-{i}");
        handles.push(tokio::spawn(async move {
            for text in ["a", "b", "c", "d", "e"] {
                memory
                    .append(&session_id, Role::User, text, TurnMetadata::new())
                    .await?;
            }
            let history = memory.get_history(&session_id, 10).await?;
            memory.clear(&session_id).await?;
            anyhow::Ok(history.iter().map(|t| t.sequence).collect::<Vec<_>>())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await??, vec![1, 2, 3, 4, 5]);
    }
    Ok(())
}
