//! Integration tests for SessionWindow.

use parley_window::{Role, SessionWindow, TurnRecord, WindowBounds};

fn turn(sequence: u64, timestamp_ms: u64) -> TurnRecord {
    TurnRecord::new("s1", sequence, Role::User, &format!("t{sequence}"), timestamp_ms)
}

#[test]
fn test_push_and_snapshot() {
    let mut w = SessionWindow::new("s1", WindowBounds::new(10, 0, 2), 0);
    assert_eq!(w.push(turn(1, 0), 5), Ok(1));
    assert_eq!(w.push(turn(2, 0), 6), Ok(2));
    let texts: Vec<String> = w.snapshot().into_iter().map(|t| t.text).collect();
    assert_eq!(texts, vec!["t1", "t2"]);
    assert_eq!(w.last_access_ms(), 6);
    assert_eq!(w.first_sequence(), Some(1));
    assert_eq!(w.last_sequence(), Some(2));
}

#[test]
fn test_push_rejects_stale_sequence() {
    let mut w = SessionWindow::new("s1", WindowBounds::new(4, 0, 1), 0);
    assert!(w.push(turn(3, 0), 0).is_ok());
    let err = w.push(turn(3, 0), 0).err();
    assert_eq!(err.map(|e| (e.last_sequence, e.sequence)), Some((3, 3)));
    assert_eq!(w.len(), 1);
}

#[test]
fn test_overflow_evicts_batch() {
    let bounds = WindowBounds::new(3, 0, 2);
    let mut w = SessionWindow::new("s1", bounds, 0);
    for seq in 1..=3 {
        assert!(w.push(turn(seq, 0), 0).is_ok());
        assert!(w.evict(0).is_empty());
    }
    assert!(w.push(turn(4, 0), 0).is_ok());
    let evicted = w.evict(0);
    assert_eq!(
        evicted.iter().map(|t| t.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(w.len(), 2);
    assert!(w.push(turn(5, 0), 0).is_ok());
    assert!(w.evict(0).is_empty());
    assert_eq!(w.first_sequence(), Some(3));
}

#[test]
fn test_keep_tail_lowers_trigger() {
    let bounds = WindowBounds::new(6, 2, 1);
    assert_eq!(bounds.high_water(), 4);
    assert_eq!(bounds.overflow(4), 0);
    assert_eq!(bounds.overflow(5), 1);
    // far above capacity: drain back to capacity in one go
    assert_eq!(bounds.overflow(9), 3);
}

#[test]
fn test_bounds_are_clamped() {
    let bounds = WindowBounds::new(0, 7, 0);
    assert_eq!(bounds.capacity, 1);
    assert_eq!(bounds.keep_tail, 0);
    assert_eq!(bounds.evict_count, 1);
    assert_eq!(WindowBounds::new(2, 0, 9).evict_count, 2);
}

#[test]
fn test_age_bound_evicts_old_turns() {
    let bounds = WindowBounds::new(10, 0, 1).with_max_age_ms(Some(1_000));
    let mut w = SessionWindow::new("s1", bounds, 0);
    assert!(w.push(turn(1, 100), 100).is_ok());
    assert!(w.push(turn(2, 900), 900).is_ok());
    assert!(w.push(turn(3, 2_000), 2_000).is_ok());
    let evicted = w.evict(2_000);
    assert_eq!(
        evicted.iter().map(|t| t.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(w.len(), 1);
}

#[test]
fn test_pop_newest_if_only_matches_tail() {
    let mut w = SessionWindow::new("s1", WindowBounds::new(5, 0, 1), 0);
    assert!(w.push(turn(1, 0), 0).is_ok());
    assert!(w.push(turn(2, 0), 0).is_ok());
    assert!(w.pop_newest_if(1).is_none());
    assert_eq!(w.pop_newest_if(2).map(|t| t.sequence), Some(2));
    assert_eq!(w.len(), 1);
}

#[test]
fn test_reseed_keeps_newest_capacity() {
    let mut w = SessionWindow::new("s1", WindowBounds::new(2, 0, 1), 0);
    let dropped = w.reseed((1..=5).map(|seq| turn(seq, 0)).collect(), 42);
    assert_eq!(
        dropped.iter().map(|t| t.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        w.snapshot().iter().map(|t| t.sequence).collect::<Vec<_>>(),
        vec![4, 5]
    );
    assert_eq!(w.last_access_ms(), 42);
}

#[test]
fn test_idle_check() {
    let mut w = SessionWindow::new("s1", WindowBounds::new(2, 0, 1), 1_000);
    assert!(!w.is_idle(1_500, 1_000));
    assert!(w.is_idle(2_000, 1_000));
    w.touch(2_000);
    assert!(!w.is_idle(2_500, 1_000));
}

#[test]
fn test_role_parsing_and_serde_alias() {
    assert_eq!("Assistant".parse::<Role>(), Ok(Role::Agent));
    assert_eq!("user".parse::<Role>(), Ok(Role::User));
    assert!("system".parse::<Role>().is_err());
    let decoded: Result<TurnRecord, _> = serde_json::from_str(
        r#"{"session_id":"s","sequence":1,"role":"assistant","text":"hi","timestamp_ms":7}"#,
    );
    assert_eq!(decoded.ok().map(|t| t.role), Some(Role::Agent));
}
