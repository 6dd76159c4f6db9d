#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parley_memory::test_support::RecordingSummarizer;
use parley_memory::{
    ManualClock, MemoryBackends, MemoryConfig, MemoryCoordinator, MemoryError, RetryPolicy, Role,
    TurnMetadata, TurnRecord,
};

fn build(
    config: MemoryConfig,
    summarizer: Arc<RecordingSummarizer>,
) -> MemoryCoordinator {
    let config = config.with_retry(RetryPolicy {
        attempts: 2,
        timeout: Duration::from_secs(1),
        backoff: Duration::ZERO,
    });
    let backends = MemoryBackends::in_memory(&config);
    MemoryCoordinator::with_clock(
        config,
        backends,
        summarizer,
        Arc::new(ManualClock::at_ms(1_000)),
    )
}

fn inline(capacity: usize, evict_count: usize) -> Result<MemoryConfig> {
    Ok(MemoryConfig::new(capacity, evict_count, Duration::from_secs(60))?.with_summary_async(false))
}

fn sequences(turns: &[TurnRecord]) -> Vec<u64> {
    turns.iter().map(|turn| turn.sequence).collect()
}

async fn append_user_turns(memory: &MemoryCoordinator, session_id: &str, count: u64) -> Result<()> {
    for i in 0..count {
        memory
            .append(session_id, Role::User, &format!("turn {i}"), TurnMetadata::new())
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn capacity_three_scenario_summarizes_two_oldest_once() -> Result<()> {
    let summarizer = Arc::new(RecordingSummarizer::new());
    let memory = build(inline(3, 2)?, summarizer.clone());
    append_user_turns(&memory, "s1", 5).await?;

    let calls = summarizer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].previous.is_none());
    assert_eq!(sequences(&calls[0].turns), vec![1, 2]);

    let context = memory.get_context("s1").await?;
    assert!(!context.stale);
    assert_eq!(sequences(&context.turns), vec![3, 4, 5]);
    let summary = context.summary.expect("summary after eviction");
    assert_eq!(summary.covered_up_to, 2);
    assert_eq!(summary.version, 1);
    assert_eq!(summary.turn_count, 2);
    assert_eq!(summary.session_id, "s1");
    Ok(())
}

#[tokio::test]
async fn window_stays_bounded_and_disjoint_from_summary() -> Result<()> {
    let config = inline(4, 2)?.with_keep_tail(1)?;
    let memory = build(config, Arc::new(RecordingSummarizer::new()));
    for i in 0..30 {
        memory
            .append("s-bound", Role::User, &format!("turn {i}"), TurnMetadata::new())
            .await?;
        let info = memory.session_info("s-bound").await?;
        assert!(info.window_len <= 4, "window grew to {}", info.window_len);

        let context = memory.get_context("s-bound").await?;
        let covered = context.summary.as_ref().map_or(0, |s| s.covered_up_to);
        assert!(context.turns.iter().all(|turn| turn.sequence > covered));
        assert_eq!(context.turns.last().map(|turn| turn.sequence), Some(i + 1));
    }
    Ok(())
}

#[tokio::test]
async fn summary_versions_advance_and_history_is_kept() -> Result<()> {
    let memory = build(inline(2, 1)?, Arc::new(RecordingSummarizer::new()));
    append_user_turns(&memory, "s-versions", 6).await?;

    let context = memory.get_context("s-versions").await?;
    let summary = context.summary.expect("summary");
    assert_eq!(summary.version, 4);
    assert_eq!(summary.covered_up_to, 4);
    assert_eq!(summary.turn_count, 4);

    let history = memory.summary_history("s-versions", 10).await?;
    let versions: Vec<u64> = history.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    let covered: Vec<u64> = history.iter().map(|s| s.covered_up_to).collect();
    assert_eq!(covered, vec![1, 2, 3]);

    assert_eq!(memory.summary_history("s-versions", 1).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn summarizer_failure_is_healed_by_next_run() -> Result<()> {
    let summarizer = Arc::new(RecordingSummarizer::new());
    let memory = build(inline(3, 2)?, summarizer.clone());

    summarizer.fail_next(1);
    append_user_turns(&memory, "s-heal", 4).await?;
    let context = memory.get_context("s-heal").await?;
    assert!(context.summary.is_none());
    assert!(!context.stale);
    // Turns 1-2 left the window but the summary never took them; the log fills in.
    assert_eq!(sequences(&context.turns), vec![1, 2, 3, 4]);

    append_user_turns(&memory, "s-heal", 2).await?;
    let calls = summarizer.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(sequences(&calls[1].turns), vec![1, 2, 3, 4]);

    let context = memory.get_context("s-heal").await?;
    let summary = context.summary.expect("healed summary");
    assert_eq!(summary.covered_up_to, 4);
    assert_eq!(summary.version, 1);
    assert_eq!(sequences(&context.turns), vec![5, 6]);
    Ok(())
}

#[tokio::test]
async fn settle_surfaces_summarizer_failure() -> Result<()> {
    let summarizer = Arc::new(RecordingSummarizer::new());
    let config = MemoryConfig::new(3, 2, Duration::from_secs(60))?;
    let memory = build(config, summarizer.clone());

    summarizer.fail_next(usize::MAX);
    // Background runs fail too; settle reports only when it ran the batch itself.
    append_user_turns(&memory, "s-settle-fail", 4).await?;
    match memory.settle("s-settle-fail").await {
        Ok(None) | Err(MemoryError::Summarization(_)) => {}
        other => panic!("unexpected settle outcome: {other:?}"),
    }
    let context = memory.get_context("s-settle-fail").await?;
    assert!(context.summary.is_none());
    assert_eq!(sequences(&context.turns), vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn async_summarization_completes_after_settle() -> Result<()> {
    let summarizer = Arc::new(RecordingSummarizer::new());
    let config = MemoryConfig::new(3, 2, Duration::from_secs(60))?;
    let memory = build(config, summarizer.clone());

    append_user_turns(&memory, "s-async", 5).await?;
    memory.settle("s-async").await?;

    let context = memory.get_context("s-async").await?;
    assert_eq!(sequences(&context.turns), vec![3, 4, 5]);
    assert_eq!(context.summary.map(|s| s.covered_up_to), Some(2));
    assert_eq!(summarizer.calls().len(), 1);
    assert_eq!(memory.session_info("s-async").await?.pending_summary_turns, 0);
    Ok(())
}

#[tokio::test]
async fn context_renders_summary_as_leading_system_message() -> Result<()> {
    let memory = build(inline(3, 2)?, Arc::new(RecordingSummarizer::new()));
    let intent: TurnMetadata = [("intent".to_string(), "billing".to_string())]
        .into_iter()
        .collect();
    memory
        .append("s-render", Role::User, "my invoice is wrong", intent.clone())
        .await?;
    memory
        .append("s-render", Role::Agent, "let me check", TurnMetadata::new())
        .await?;
    memory
        .append("s-render", Role::User, "thanks", intent)
        .await?;
    memory
        .append("s-render", Role::Agent, "fixed it", TurnMetadata::new())
        .await?;

    let messages = memory.get_context("s-render").await?.to_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, "system");
    assert!(
        messages[0]
            .content
            .starts_with("[Summary of earlier conversation: Turns 1-2")
    );
    assert!(messages[0].content.contains("main topic=billing"));
    assert_eq!(messages[1].role, "user");
    assert_eq!(messages[1].content, "thanks");
    assert_eq!(messages[2].role, "agent");
    Ok(())
}
