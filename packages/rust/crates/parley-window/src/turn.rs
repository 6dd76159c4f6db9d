//! Single conversational turn.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque caller metadata attached to a turn (channel, intent name, user id, ...).
///
/// Ordered so the serialized form is byte-stable across writes.
pub type TurnMetadata = BTreeMap<String, String>;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user message.
    User,
    /// Bot response.
    #[serde(alias = "assistant")]
    Agent,
}

impl Role {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "agent" | "assistant" | "bot" => Ok(Self::Agent),
            other => Err(format!("unknown turn role `{other}`; expected user|agent")),
        }
    }
}

/// One message appended to a session, with its coordinator-assigned sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Conversation identifier.
    pub session_id: String,
    /// Per-session sequence number, starting at 1, never reused.
    pub sequence: u64,
    /// Producer of the turn.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// Unix timestamp in milliseconds assigned at append time.
    pub timestamp_ms: u64,
    /// Opaque caller metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: TurnMetadata,
}

impl TurnRecord {
    /// Build a turn record.
    pub fn new(
        session_id: &str,
        sequence: u64,
        role: Role,
        text: &str,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence,
            role,
            text: text.to_string(),
            timestamp_ms,
            metadata: TurnMetadata::new(),
        }
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Metadata value by key.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
