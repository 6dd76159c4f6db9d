use std::collections::BTreeMap;

use async_trait::async_trait;
use parley_window::{Role, TurnRecord};

use super::{Summarizer, Summary};
use crate::clock::now_unix_ms;
use crate::error::SummarizationError;

const INTENT_METADATA_KEY: &str = "intent";
const KEY_POINT_INTENTS: [&str; 3] = ["complaint", "request", "question"];
const SEGMENT_SEPARATOR: &str = " | ";
const ELIDED: &str = "...";

/// Reduce an evicted batch to `(intent, agent replies, outcome)`.
#[must_use]
pub fn summarise_evicted_turns(turns: &[TurnRecord]) -> (String, String, String) {
    let intent = turns
        .iter()
        .find(|turn| turn.role == Role::User)
        .map_or("(no user message)", |turn| turn.text.as_str())
        .to_string();
    let experience = turns
        .iter()
        .filter(|turn| turn.role == Role::Agent)
        .map(|turn| turn.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let experience = if experience.is_empty() {
        "(no agent response)".to_string()
    } else {
        experience
    };
    let has_error = turns.iter().any(|turn| {
        let lower = turn.text.to_lowercase();
        lower.contains("error") || lower.contains("failed") || lower.contains("exception")
    });
    let outcome = if has_error { "error" } else { "completed" }.to_string();
    (intent, experience, outcome)
}

/// Deterministic summarizer: one compact line per batch appended to the
/// previous text. Older segments are dropped whole to stay within `max_chars`.
#[derive(Debug, Clone, Copy)]
pub struct RuleSummarizer {
    max_chars: usize,
}

impl RuleSummarizer {
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(16),
        }
    }

    fn segment(turns: &[TurnRecord]) -> String {
        let (intent, experience, outcome) = summarise_evicted_turns(turns);
        let first = turns.first().map_or(0, |turn| turn.sequence);
        let last = turns.last().map_or(0, |turn| turn.sequence);
        let user_turns = turns.iter().filter(|turn| turn.role == Role::User).count();
        let mut segment = format!(
            "Turns {first}-{last} ({user_turns} from user): outcome={outcome}; intent={intent}; agent={experience}",
            intent = compact_single_line(&intent, 120),
            experience = compact_single_line(&experience, 160),
        );
        if let Some((topic, count)) = main_topic(turns) {
            segment.push_str(&format!("; main topic={topic} ({count}x)"));
        }
        let key_points = key_points(turns);
        if !key_points.is_empty() {
            segment.push_str("; ");
            segment.push_str(&key_points.join("; "));
        }
        segment
    }
}

impl Default for RuleSummarizer {
    fn default() -> Self {
        Self::new(480)
    }
}

#[async_trait]
impl Summarizer for RuleSummarizer {
    async fn summarize(
        &self,
        previous: Option<&Summary>,
        turns: &[TurnRecord],
    ) -> Result<Summary, SummarizationError> {
        let (Some(first), Some(last)) = (turns.first(), turns.last()) else {
            return Err(SummarizationError::new("no turns to summarize"));
        };
        let segment = Self::segment(turns);
        let text = match previous {
            Some(prev) if !prev.text.is_empty() => {
                format!("{}{SEGMENT_SEPARATOR}{segment}", prev.text)
            }
            _ => segment,
        };
        Ok(Summary {
            session_id: first.session_id.clone(),
            covered_up_to: last.sequence,
            text: fit_segments(&text, self.max_chars),
            version: previous.map_or(1, |prev| prev.version + 1),
            turn_count: previous.map_or(0, |prev| prev.turn_count)
                + u64::try_from(turns.len()).unwrap_or(u64::MAX),
            created_at_ms: now_unix_ms(),
        })
    }
}

fn main_topic(turns: &[TurnRecord]) -> Option<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for intent in turns.iter().filter_map(|turn| turn.meta(INTENT_METADATA_KEY)) {
        *counts.entry(intent).or_default() += 1;
    }
    // Ties go to the alphabetically first intent.
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map(|(intent, count)| (intent.to_string(), count))
}

fn key_points(turns: &[TurnRecord]) -> Vec<String> {
    turns
        .iter()
        .filter_map(|turn| {
            let intent = turn.meta(INTENT_METADATA_KEY)?;
            if !KEY_POINT_INTENTS.contains(&intent) || turn.text.trim().is_empty() {
                return None;
            }
            let mut label = intent.to_string();
            if let Some(head) = label.get_mut(..1) {
                head.make_ascii_uppercase();
            }
            Some(format!("{label}: {}", compact_single_line(&turn.text, 100)))
        })
        .collect()
}

fn compact_single_line(input: &str, max_chars: usize) -> String {
    let normalized = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let keep = max_chars.saturating_sub(3);
    let mut out = normalized.chars().take(keep).collect::<String>();
    out.push_str("...");
    out
}

/// Drop whole leading segments until the text fits; a lone newest segment
/// that is still too long is cut at its end, keeping its header fields.
fn fit_segments(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let segments: Vec<&str> = text.split(SEGMENT_SEPARATOR).collect();
    let budget = max_chars.saturating_sub(ELIDED.len());
    for start in 1..segments.len() {
        let kept = segments[start..].join(SEGMENT_SEPARATOR);
        if kept.chars().count() <= budget {
            return format!("{ELIDED}{kept}");
        }
    }
    let newest = segments.last().copied().unwrap_or_default();
    if segments.len() > 1 {
        format!("{ELIDED}{}", compact_single_line(newest, budget))
    } else {
        compact_single_line(newest, max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(sequence: u64, role: Role, text: &str, intent: Option<&str>) -> TurnRecord {
        let record = TurnRecord::new("s", sequence, role, text, 0);
        match intent {
            Some(intent) => record.with_metadata(
                [(INTENT_METADATA_KEY.to_string(), intent.to_string())]
                    .into_iter()
                    .collect(),
            ),
            None => record,
        }
    }

    #[tokio::test]
    async fn folds_batch_into_first_version() -> anyhow::Result<()> {
        let turns = vec![
            turn(1, Role::User, "where is my order", Some("question")),
            turn(2, Role::Agent, "it ships tomorrow", None),
        ];
        let summary = RuleSummarizer::default()
            .summarize(None, &turns)
            .await?;
        assert_eq!(summary.version, 1);
        assert_eq!(summary.covered_up_to, 2);
        assert_eq!(summary.turn_count, 2);
        assert!(summary.text.starts_with("Turns 1-2 (1 from user): outcome=completed"));
        assert!(summary.text.contains("main topic=question (1x)"));
        assert!(summary.text.contains("Question: where is my order"));
        Ok(())
    }

    #[tokio::test]
    async fn appends_to_previous_and_trims_front() -> anyhow::Result<()> {
        let previous = Summary {
            session_id: "s".to_string(),
            covered_up_to: 2,
            text: "x".repeat(100),
            version: 3,
            turn_count: 2,
            created_at_ms: 0,
        };
        let turns = vec![turn(3, Role::User, "the payment failed", None)];
        let summary = RuleSummarizer::new(64)
            .summarize(Some(&previous), &turns)
            .await?;
        assert_eq!(summary.version, 4);
        assert_eq!(summary.turn_count, 3);
        assert_eq!(summary.text.chars().count(), 64);
        assert!(summary.text.starts_with("..."));
        assert!(summary.text.contains("outcome=error"));
        Ok(())
    }

    #[tokio::test]
    async fn drops_whole_older_segments_first() -> anyhow::Result<()> {
        let summarizer = RuleSummarizer::new(200);
        let first = summarizer
            .summarize(None, &[turn(1, Role::User, "where is my parcel", None)])
            .await?;
        let second = summarizer
            .summarize(Some(&first), &[turn(2, Role::User, "cancel it please", None)])
            .await?;
        let third = summarizer
            .summarize(Some(&second), &[turn(3, Role::User, "refund failed again", None)])
            .await?;

        assert!(third.text.chars().count() <= 200);
        assert!(third.text.starts_with("...Turns 2-2 "), "{}", third.text);
        assert!(!third.text.contains("Turns 1-1"));
        assert!(third.text.contains(" | Turns 3-3 (1 from user): outcome=error"));
        Ok(())
    }

    #[tokio::test]
    async fn long_first_segment_keeps_its_header() -> anyhow::Result<()> {
        let text = "word ".repeat(60);
        let summary = RuleSummarizer::new(48)
            .summarize(None, &[turn(7, Role::User, &text, None)])
            .await?;
        assert_eq!(summary.text.chars().count(), 48);
        assert!(summary.text.starts_with("Turns 7-7 (1 from user): outcome=completed"));
        assert!(summary.text.ends_with("..."));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_empty_batch() -> anyhow::Result<()> {
        let result = RuleSummarizer::default().summarize(None, &[]).await;
        assert!(result.is_err());
        Ok(())
    }
}
