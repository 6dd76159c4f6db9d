//! Shared Valkey connection with reconnect-once command execution.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisResult};
use tokio::sync::Mutex;

use crate::observability::MemoryEvent;

/// Live connection tagged with the generation that opened it.
struct Slot {
    generation: u64,
    connection: MultiplexedConnection,
}

/// Lazily opened multiplexed connection shared by the Valkey backends.
///
/// The mutex guards only opening and replacing the connection; queries run
/// on a clone so sessions never wait on each other.
#[derive(Clone)]
pub(crate) struct ValkeyConnection {
    client: redis::Client,
    key_prefix: String,
    slot: Arc<Mutex<Option<Slot>>>,
    generations: Arc<AtomicU64>,
}

impl ValkeyConnection {
    pub(crate) fn open(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("invalid valkey url for memory backend: {url}"))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.trim_end_matches(':').to_string(),
            slot: Arc::new(Mutex::new(None)),
            generations: Arc::new(AtomicU64::new(0)),
        })
    }

    pub(crate) fn key(&self, kind: &str, session_id: &str) -> String {
        format!("{}:{kind}:{session_id}", self.key_prefix)
    }

    async fn checkout(&self) -> Result<(u64, MultiplexedConnection)> {
        let mut slot = self.slot.lock().await;
        if let Some(live) = slot.as_ref() {
            return Ok((live.generation, live.connection.clone()));
        }
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to open valkey connection for memory backend")?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            event = MemoryEvent::ValkeyConnected.as_str(),
            key_prefix = %self.key_prefix,
            generation,
            "valkey memory backend connected"
        );
        *slot = Some(Slot {
            generation,
            connection: connection.clone(),
        });
        Ok((generation, connection))
    }

    /// Forget a broken connection unless someone already replaced it.
    async fn discard(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|live| live.generation == generation) {
            *slot = None;
        }
    }

    async fn run_with<T, F, Fut>(&self, operation: &'static str, send: F) -> Result<T>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut failure = None;
        for attempt in 1..=2_u32 {
            let (generation, connection) = self.checkout().await?;
            match send(connection).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            event = MemoryEvent::ValkeyCommandRetrySucceeded.as_str(),
                            operation,
                            attempt,
                            "valkey call succeeded after reconnect"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(
                        event = MemoryEvent::ValkeyCommandRetryFailed.as_str(),
                        operation,
                        attempt,
                        error = %error,
                        "valkey call failed; reconnecting"
                    );
                    self.discard(generation).await;
                    failure = Some(error);
                }
            }
        }
        Err(match failure {
            Some(error) => anyhow::Error::new(error).context(format!("valkey {operation} failed")),
            None => anyhow::anyhow!("valkey {operation} failed"),
        })
    }

    pub(crate) async fn run_command<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        self.run_with(operation, |mut connection| {
            let cmd = build();
            async move { cmd.query_async(&mut connection).await }
        })
        .await
    }

    pub(crate) async fn run_pipeline<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Pipeline,
    {
        self.run_with(operation, |mut connection| {
            let pipeline = build();
            async move { pipeline.query_async(&mut connection).await }
        })
        .await
    }
}
