//! Redis-backed frontier
//!
//! Pending and visited paths are two Redis sets under a shared key prefix,
//! so several crawler processes can share one crawl.

use crate::config::FrontierConfig;
use crate::frontier::traits::{Frontier, FrontierError, FrontierResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Adds ARGV[1] to the pending set unless it is already visited.
/// Returns -1 for a visited path, otherwise the SADD result.
const PUSH_SCRIPT: &str = r#"
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
    return -1
end
return redis.call('SADD', KEYS[1], ARGV[1])
"#;

/// Frontier stored in Redis
///
/// A background task pings the server periodically. While the last ping
/// failed, every operation short-circuits with
/// [`FrontierError::StorageUnavailable`] instead of waiting on a dead
/// connection.
pub struct RedisFrontier {
    conn: ConnectionManager,
    pending_key: String,
    visited_key: String,
    push_script: Script,
    ready: Arc<AtomicBool>,
}

impl RedisFrontier {
    /// Connects to Redis and starts the health check
    ///
    /// # Arguments
    ///
    /// * `config` - Frontier configuration; `redis-url` must be set
    /// * `shutdown` - Token that stops the health check
    ///
    /// # Returns
    ///
    /// * `Ok(RedisFrontier)` - Connected and answered the first PING
    /// * `Err(FrontierError::StorageUnavailable)` - Could not connect
    pub async fn connect(
        config: &FrontierConfig,
        shutdown: CancellationToken,
    ) -> FrontierResult<Self> {
        let url = config.redis_url.as_deref().ok_or_else(|| {
            FrontierError::StorageUnavailable("redis-url is not configured".to_string())
        })?;

        let client = redis::Client::open(url).map_err(unavailable)?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(unavailable)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        tracing::info!(url = %url, prefix = %config.key_prefix, "Connected to Redis frontier");

        let ready = Arc::new(AtomicBool::new(true));
        spawn_health_check(
            conn.clone(),
            ready.clone(),
            Duration::from_secs(config.ping_interval_secs),
            shutdown,
        );

        let (pending_key, visited_key) = set_keys(&config.key_prefix);
        Ok(Self {
            conn,
            pending_key,
            visited_key,
            push_script: Script::new(PUSH_SCRIPT),
            ready,
        })
    }

    /// Returns true if the last health check succeeded
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn connection(&self) -> FrontierResult<ConnectionManager> {
        if self.is_ready() {
            Ok(self.conn.clone())
        } else {
            Err(FrontierError::StorageUnavailable(
                "redis health check failing".to_string(),
            ))
        }
    }
}

/// Pending and visited set names under `prefix`
fn set_keys(prefix: &str) -> (String, String) {
    (format!("{}/raw", prefix), format!("{}/cook", prefix))
}

fn unavailable(e: RedisError) -> FrontierError {
    FrontierError::StorageUnavailable(e.to_string())
}

fn spawn_health_check(
    mut conn: ConnectionManager,
    ready: Arc<AtomicBool>,
    every: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let ping: Result<String, RedisError> =
                redis::cmd("PING").query_async(&mut conn).await;
            let healthy = ping.is_ok();
            let was_healthy = ready.swap(healthy, Ordering::SeqCst);

            match (was_healthy, ping) {
                (true, Err(e)) => tracing::warn!("Redis frontier unreachable: {}", e),
                (false, Ok(_)) => tracing::info!("Redis frontier reachable again"),
                _ => {}
            }
        }

        tracing::debug!("Redis health check stopped");
    });
}

#[async_trait]
impl Frontier for RedisFrontier {
    async fn reset(&self) -> FrontierResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn
            .del(vec![self.pending_key.as_str(), self.visited_key.as_str()])
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn push(&self, path: &str) -> FrontierResult<()> {
        let mut conn = self.connection()?;
        let added: i64 = self
            .push_script
            .key(&self.pending_key)
            .key(&self.visited_key)
            .arg(path)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        if added < 0 {
            return Err(FrontierError::AlreadyVisited(path.to_string()));
        }
        Ok(())
    }

    async fn pop(&self) -> FrontierResult<String> {
        let mut conn = self.connection()?;
        let popped: Option<String> = conn
            .spop(&self.pending_key)
            .await
            .map_err(unavailable)?;
        popped.ok_or(FrontierError::Empty)
    }

    async fn persist(&self, path: &str) -> FrontierResult<()> {
        let mut conn = self.connection()?;
        let _: () = redis::pipe()
            .atomic()
            .srem(&self.pending_key, path)
            .ignore()
            .sadd(&self.visited_key, path)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn pending_len(&self) -> FrontierResult<u64> {
        let mut conn = self.connection()?;
        conn.scard(&self.pending_key).await.map_err(unavailable)
    }

    async fn visited_len(&self) -> FrontierResult<u64> {
        let mut conn = self.connection()?;
        conn.scard(&self.visited_key).await.map_err(unavailable)
    }
}
