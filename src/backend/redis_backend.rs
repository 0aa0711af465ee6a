use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::{watch, Mutex};

use super::{Backend, PubSubConn};
use crate::error::{Result, StoreError};

/// Concrete `Backend` over the `redis` crate. Holds a single multiplexed
/// connection for ordinary commands (cloned cheaply per call, as
/// `MultiplexedConnection` is a handle to a background I/O task — the same
/// clone-per-call shape `ana-online-judge`'s `RedisManager` uses around its
/// `MultiplexedConnection`), plus a `ready` channel subsystems can watch for
/// reconnect notifications.
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    conn: Arc<Mutex<MultiplexedConnection>>,
    connected: Arc<AtomicBool>,
    ready_tx: Arc<watch::Sender<()>>,
    retry_limit: u32,
    retry_gap: Duration,
}

impl RedisBackend {
    pub async fn connect(url: &str, retry_limit: u32, retry_gap: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Config(format!("invalid redis url {url}: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        let (ready_tx, _) = watch::channel(());
        Ok(Self {
            client,
            conn: Arc::new(Mutex::new(conn)),
            connected: Arc::new(AtomicBool::new(true)),
            ready_tx: Arc::new(ready_tx),
            retry_limit,
            retry_gap,
        })
    }

    /// Subscribe to reconnect notifications, emitted every time a command
    /// retry succeeds in re-establishing the connection.
    pub fn subscribe_ready(&self) -> watch::Receiver<()> {
        self.ready_tx.subscribe()
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let mut attempts = 0u32;
        loop {
            let conn = self.conn.lock().await.clone();
            match op(conn).await {
                Ok(value) => {
                    self.connected.store(true, Ordering::SeqCst);
                    return Ok(value);
                }
                Err(err) => {
                    self.connected.store(false, Ordering::SeqCst);
                    attempts += 1;
                    if attempts > self.retry_limit {
                        return Err(StoreError::Transient(format!(
                            "command failed after {attempts} attempts: {err}"
                        )));
                    }
                    tracing::warn!(attempt = attempts, error = %err, "backend command failed; retrying");
                    tokio::time::sleep(self.retry_gap).await;
                    if let Ok(new_conn) = self.client.get_multiplexed_async_connection().await {
                        *self.conn.lock().await = new_conn;
                        self.connected.store(true, Ordering::SeqCst);
                        let _ = self.ready_tx.send(());
                        tracing::info!("backend reconnected");
                    }
                }
            }
        }
    }
}

impl Backend for RedisBackend {
    type PubSub = RedisPubSubConn;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.get(&key).await }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut c| {
            let (key, value) = (key.clone(), value.clone());
            async move { c.set(&key, &value).await }
        })
        .await
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut c| {
            let (key, value) = (key.clone(), value.clone());
            async move { c.set_ex(&key, &value, ttl_secs).await }
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.del(&key).await }
        })
        .await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut c| {
            let (key, value) = (key.clone(), value.clone());
            async move { c.lpush(&key, &value).await }
        })
        .await
    }

    async fn llen(&self, key: &str) -> Result<i64> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.llen(&key).await }
        })
        .await
    }

    async fn lmove_left_right(&self, src: &str, dst: &str) -> Result<Option<String>> {
        let (src, dst) = (src.to_string(), dst.to_string());
        self.with_retry(move |mut c| {
            let (src, dst) = (src.clone(), dst.clone());
            async move {
                c.lmove(&src, &dst, redis::Direction::Left, redis::Direction::Right)
                    .await
            }
        })
        .await
    }

    async fn lmove_right_left(&self, src: &str, dst: &str) -> Result<Option<String>> {
        let (src, dst) = (src.to_string(), dst.to_string());
        self.with_retry(move |mut c| {
            let (src, dst) = (src.clone(), dst.clone());
            async move {
                c.lmove(&src, &dst, redis::Direction::Right, redis::Direction::Left)
                    .await
            }
        })
        .await
    }

    async fn lrem_one(&self, key: &str, value: &str) -> Result<i64> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut c| {
            let (key, value) = (key.clone(), value.clone());
            async move { c.lrem(&key, 1, &value).await }
        })
        .await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let (key, field, value) = (key.to_string(), field.to_string(), value.to_string());
        self.with_retry(move |mut c| {
            let (key, field, value) = (key.clone(), field.clone(), value.clone());
            async move { c.hset(&key, &field, &value).await }
        })
        .await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_retry(move |mut c| {
            let (key, field) = (key.clone(), field.clone());
            async move { c.hdel(&key, &field).await }
        })
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_retry(move |mut c| {
            let (key, field) = (key.clone(), field.clone());
            async move { c.hget(&key, &field).await }
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.hgetall(&key).await }
        })
        .await
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.hvals(&key).await }
        })
        .await
    }

    async fn hlen(&self, key: &str) -> Result<i64> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.hlen(&key).await }
        })
        .await
    }

    async fn sadd(&self, key: &str, values: &[String]) -> Result<()> {
        let (key, values) = (key.to_string(), values.to_vec());
        self.with_retry(move |mut c| {
            let (key, values) = (key.clone(), values.clone());
            async move { c.sadd(&key, values).await }
        })
        .await
    }

    async fn srem(&self, key: &str, values: &[String]) -> Result<()> {
        let (key, values) = (key.to_string(), values.to_vec());
        self.with_retry(move |mut c| {
            let (key, values) = (key.clone(), values.clone());
            async move { c.srem(&key, values).await }
        })
        .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let key = key.to_string();
        self.with_retry(move |mut c| {
            let key = key.clone();
            async move { c.smembers(&key).await }
        })
        .await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let (channel, payload) = (channel.to_string(), payload.to_string());
        self.with_retry(move |mut c| {
            let (channel, payload) = (channel.clone(), payload.clone());
            async move { c.publish(&channel, &payload).await }
        })
        .await
    }

    async fn duplicate_pubsub(&self) -> Result<Self::PubSub> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        Ok(RedisPubSubConn {
            inner: conn.into_pubsub(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A dedicated pub/sub connection. Owns the connection exclusively for its
/// lifetime, per spec.md §5's shared-resource policy.
pub struct RedisPubSubConn {
    inner: redis::aio::PubSub,
}

impl PubSubConn for RedisPubSubConn {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.inner
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
    }

    async fn next_message(&mut self) -> Result<String> {
        use futures::StreamExt;
        let mut stream = self.inner.on_message();
        match stream.next().await {
            Some(msg) => msg
                .get_payload::<String>()
                .map_err(|e| StoreError::Transient(e.to_string())),
            None => Err(StoreError::Transient(
                "pub/sub connection closed".to_string(),
            )),
        }
    }
}
