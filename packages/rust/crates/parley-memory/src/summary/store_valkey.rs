use async_trait::async_trait;

use super::{Summary, SummaryStore};
use crate::error::StoreError;
use crate::valkey::ValkeyConnection;

const SAVE_SCRIPT: &str = r#"
local key = KEYS[1]
local history_key = KEYS[2]
local covered = tonumber(ARGV[1])
local history_max = tonumber(ARGV[2]) or 0
local existing = redis.call("GET", key)
if existing then
  local decoded = cjson.decode(existing)
  if tonumber(decoded["covered_up_to"]) > covered then
    return -1
  end
  if history_max > 0 then
    redis.call("RPUSH", history_key, existing)
    redis.call("LTRIM", history_key, -history_max, -1)
  end
end
redis.call("SET", key, ARGV[3])
return 1
"#;

/// `{prefix}:summary:{sid}` holds the current JSON summary,
/// `{prefix}:summary-history:{sid}` the bounded list of prior versions.
pub struct ValkeySummaryStore {
    conn: ValkeyConnection,
    history_max: usize,
}

impl ValkeySummaryStore {
    pub(crate) fn new(conn: ValkeyConnection, history_max: usize) -> Self {
        Self { conn, history_max }
    }
}

#[async_trait]
impl SummaryStore for ValkeySummaryStore {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn load(&self, session_id: &str) -> Result<Option<Summary>, StoreError> {
        let key = self.conn.key("summary", session_id);
        let payload: Option<String> = self
            .conn
            .run_command("summary_load", || {
                let mut cmd = redis::cmd("GET");
                cmd.arg(&key);
                cmd
            })
            .await?;
        payload
            .map(|raw| serde_json::from_str::<Summary>(&raw).map_err(StoreError::from))
            .transpose()
    }

    async fn save(&self, summary: &Summary) -> Result<(), StoreError> {
        let key = self.conn.key("summary", &summary.session_id);
        let history_key = self.conn.key("summary-history", &summary.session_id);
        let payload = serde_json::to_string(summary)?;
        let history_max = self.history_max;
        let outcome: i64 = self
            .conn
            .run_command("summary_save", || {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(SAVE_SCRIPT)
                    .arg(2)
                    .arg(&key)
                    .arg(&history_key)
                    .arg(summary.covered_up_to)
                    .arg(history_max)
                    .arg(&payload);
                cmd
            })
            .await?;
        if outcome < 0 {
            return Err(StoreError::Conflict {
                session_id: summary.session_id.clone(),
                sequence: summary.covered_up_to,
            });
        }
        Ok(())
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Summary>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.conn.key("summary-history", session_id);
        let start = -i64::try_from(limit).unwrap_or(i64::MAX);
        let payloads: Vec<String> = self
            .conn
            .run_command("summary_history", || {
                let mut cmd = redis::cmd("LRANGE");
                cmd.arg(&key).arg(start).arg(-1);
                cmd
            })
            .await?;
        payloads
            .iter()
            .map(|raw| serde_json::from_str::<Summary>(raw).map_err(StoreError::from))
            .collect()
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let key = self.conn.key("summary", session_id);
        let history_key = self.conn.key("summary-history", session_id);
        self.conn
            .run_command::<(), _>("summary_delete", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(&key).arg(&history_key);
                cmd
            })
            .await?;
        Ok(())
    }
}
