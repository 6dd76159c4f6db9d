use async_trait::async_trait;
use parley_window::TurnRecord;

use super::DurableLog;
use crate::error::StoreError;
use crate::valkey::ValkeyConnection;

/// 1 = written, 0 = identical member already present, -1 = different member at that score.
const WRITE_SCRIPT: &str = r#"
local key = KEYS[1]
local seq = ARGV[1]
local existing = redis.call("ZRANGEBYSCORE", key, seq, seq)
if #existing > 0 then
  if existing[1] == ARGV[2] then
    return 0
  end
  return -1
end
redis.call("ZADD", key, seq, ARGV[2])
return 1
"#;

/// Sorted set per session (`{prefix}:log:{sid}`), score = sequence.
pub struct ValkeyDurableLog {
    conn: ValkeyConnection,
}

impl ValkeyDurableLog {
    pub(crate) fn new(conn: ValkeyConnection) -> Self {
        Self { conn }
    }

    fn log_key(&self, session_id: &str) -> String {
        self.conn.key("log", session_id)
    }
}

#[async_trait]
impl DurableLog for ValkeyDurableLog {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn write(&self, turn: &TurnRecord) -> Result<(), StoreError> {
        let key = self.log_key(&turn.session_id);
        let payload = serde_json::to_string(turn)?;
        let outcome: i64 = self
            .conn
            .run_command("log_write", || {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(WRITE_SCRIPT)
                    .arg(1)
                    .arg(&key)
                    .arg(turn.sequence)
                    .arg(&payload);
                cmd
            })
            .await?;
        if outcome < 0 {
            return Err(StoreError::Conflict {
                session_id: turn.session_id.clone(),
                sequence: turn.sequence,
            });
        }
        Ok(())
    }

    async fn read_range(
        &self,
        session_id: &str,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.log_key(session_id);
        let count = i64::try_from(limit).unwrap_or(i64::MAX);
        let payloads: Vec<String> = self
            .conn
            .run_command("log_read_range", || {
                let mut cmd = redis::cmd("ZRANGEBYSCORE");
                cmd.arg(&key)
                    .arg(from_sequence)
                    .arg("+inf")
                    .arg("LIMIT")
                    .arg(0)
                    .arg(count);
                cmd
            })
            .await?;
        payloads
            .iter()
            .map(|payload| serde_json::from_str::<TurnRecord>(payload).map_err(StoreError::from))
            .collect()
    }

    async fn last_sequence(&self, session_id: &str) -> Result<Option<u64>, StoreError> {
        let key = self.log_key(session_id);
        let newest: Vec<(String, f64)> = self
            .conn
            .run_command("log_last_sequence", || {
                let mut cmd = redis::cmd("ZRANGE");
                cmd.arg(&key).arg(-1).arg(-1).arg("WITHSCORES");
                cmd
            })
            .await?;
        match newest.into_iter().next() {
            Some((payload, _)) => Ok(Some(serde_json::from_str::<TurnRecord>(&payload)?.sequence)),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, StoreError> {
        let key = self.log_key(session_id);
        let (count, _): (usize, i64) = self
            .conn
            .run_pipeline("log_delete_session", || {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.cmd("ZCARD").arg(&key);
                pipe.cmd("DEL").arg(&key);
                pipe
            })
            .await?;
        Ok(count)
    }
}
