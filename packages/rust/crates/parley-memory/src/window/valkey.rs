use async_trait::async_trait;
use parley_window::{TurnRecord, WindowBounds};

use super::WindowBackend;
use crate::error::StoreError;
use crate::valkey::ValkeyConnection;

const APPEND_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1]) or 0
local seq = tonumber(ARGV[2])
local last = redis.call("LINDEX", key, -1)
if last then
  local decoded = cjson.decode(last)
  if tonumber(decoded["sequence"]) >= seq then
    return -1
  end
end
local len = redis.call("RPUSH", key, ARGV[3])
if ttl > 0 then
  redis.call("EXPIRE", key, ttl)
end
return len
"#;

const ROLLBACK_SCRIPT: &str = r#"
local key = KEYS[1]
local last = redis.call("LINDEX", key, -1)
if not last then
  return 0
end
local decoded = cjson.decode(last)
if tonumber(decoded["sequence"]) == tonumber(ARGV[1]) then
  redis.call("RPOP", key)
  return 1
end
return 0
"#;

const EVICT_SCRIPT: &str = r#"
local key = KEYS[1]
local high_water = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local evict_count = tonumber(ARGV[3])
local cutoff = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5]) or 0
local len = redis.call("LLEN", key)
local take = 0
if len > high_water then
  take = math.max(evict_count, len - capacity)
  if take > len then
    take = len
  end
end
if cutoff >= 0 and take < len then
  local rest = redis.call("LRANGE", key, take, -1)
  for _, item in ipairs(rest) do
    local decoded = cjson.decode(item)
    if tonumber(decoded["timestamp_ms"]) < cutoff then
      take = take + 1
    else
      break
    end
  end
end
if take == 0 then
  return {}
end
local drained = redis.call("LRANGE", key, 0, take - 1)
redis.call("LTRIM", key, take, -1)
if ttl > 0 and redis.call("EXISTS", key) == 1 then
  redis.call("EXPIRE", key, ttl)
end
return drained
"#;

/// Valkey list per session (`{prefix}:window:{sid}`), TTL = idle timeout.
/// An empty or missing list is a cold window.
pub struct ValkeyWindowBackend {
    conn: ValkeyConnection,
    bounds: WindowBounds,
    ttl_secs: u64,
}

impl ValkeyWindowBackend {
    pub(crate) fn new(conn: ValkeyConnection, bounds: WindowBounds, idle_timeout_ms: u64) -> Self {
        Self {
            conn,
            bounds,
            ttl_secs: idle_timeout_ms.div_ceil(1000).max(1),
        }
    }

    fn window_key(&self, session_id: &str) -> String {
        self.conn.key("window", session_id)
    }
}

fn decode_turns(payloads: Vec<String>) -> Result<Vec<TurnRecord>, StoreError> {
    payloads
        .iter()
        .map(|payload| serde_json::from_str::<TurnRecord>(payload).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl WindowBackend for ValkeyWindowBackend {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn load(
        &self,
        session_id: &str,
        _now_ms: u64,
    ) -> Result<Option<Vec<TurnRecord>>, StoreError> {
        let key = self.window_key(session_id);
        let ttl = self.ttl_secs;
        let (payloads,): (Vec<String>,) = self
            .conn
            .run_pipeline("window_load", || {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.cmd("LRANGE").arg(&key).arg(0).arg(-1);
                pipe.cmd("EXPIRE").arg(&key).arg(ttl).ignore();
                pipe
            })
            .await?;
        if payloads.is_empty() {
            return Ok(None);
        }
        decode_turns(payloads).map(Some)
    }

    async fn append(&self, turn: &TurnRecord, _now_ms: u64) -> Result<usize, StoreError> {
        let key = self.window_key(&turn.session_id);
        let payload = serde_json::to_string(turn)?;
        let ttl = self.ttl_secs;
        let len: i64 = self
            .conn
            .run_command("window_append", || {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(APPEND_SCRIPT)
                    .arg(1)
                    .arg(&key)
                    .arg(ttl)
                    .arg(turn.sequence)
                    .arg(&payload);
                cmd
            })
            .await?;
        usize::try_from(len).map_err(|_| StoreError::Conflict {
            session_id: turn.session_id.clone(),
            sequence: turn.sequence,
        })
    }

    async fn rollback(&self, session_id: &str, sequence: u64) -> Result<bool, StoreError> {
        let key = self.window_key(session_id);
        let popped: i64 = self
            .conn
            .run_command("window_rollback", || {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(ROLLBACK_SCRIPT).arg(1).arg(&key).arg(sequence);
                cmd
            })
            .await?;
        Ok(popped == 1)
    }

    async fn evict(&self, session_id: &str, now_ms: u64) -> Result<Vec<TurnRecord>, StoreError> {
        let key = self.window_key(session_id);
        let bounds = self.bounds;
        let cutoff = bounds
            .age_cutoff_ms(now_ms)
            .and_then(|ms| i64::try_from(ms).ok())
            .unwrap_or(-1);
        let ttl = self.ttl_secs;
        let drained: Vec<String> = self
            .conn
            .run_command("window_evict", || {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(EVICT_SCRIPT)
                    .arg(1)
                    .arg(&key)
                    .arg(bounds.high_water())
                    .arg(bounds.capacity)
                    .arg(bounds.evict_count)
                    .arg(cutoff)
                    .arg(ttl);
                cmd
            })
            .await?;
        decode_turns(drained)
    }

    async fn reseed(
        &self,
        session_id: &str,
        mut turns: Vec<TurnRecord>,
        _now_ms: u64,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        let overflow = turns.len().saturating_sub(self.bounds.capacity);
        let kept = turns.split_off(overflow);
        let key = self.window_key(session_id);
        let encoded = kept
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let ttl = self.ttl_secs;
        self.conn
            .run_pipeline::<(), _>("window_reseed", || {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.cmd("DEL").arg(&key).ignore();
                if !encoded.is_empty() {
                    pipe.cmd("RPUSH").arg(&key);
                    for payload in &encoded {
                        pipe.arg(payload);
                    }
                    pipe.ignore();
                    pipe.cmd("EXPIRE").arg(&key).arg(ttl).ignore();
                }
                pipe
            })
            .await?;
        Ok(turns)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        let key = self.window_key(session_id);
        let removed: i64 = self
            .conn
            .run_command("window_remove", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(removed > 0)
    }

    async fn idle_sessions(&self, _now_ms: u64) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    async fn remove_if_idle(&self, _session_id: &str, _now_ms: u64) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn len(&self, session_id: &str, _now_ms: u64) -> Result<Option<usize>, StoreError> {
        let key = self.window_key(session_id);
        let len: usize = self
            .conn
            .run_command("window_len", || {
                let mut cmd = redis::cmd("LLEN");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok((len > 0).then_some(len))
    }
}
