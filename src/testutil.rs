//! In-memory `Backend` fake, exercised by every other module's inline tests
//! so none of them need a live Redis server — the same role `keeper-rs`'s
//! `M: Middleware` genericity plays when its tests run against a fake
//! provider instead of a live RPC endpoint.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::backend::{Backend, PubSubConn};
use crate::error::Result;

/// Wires up the same `tracing_subscriber::fmt` + `EnvFilter` setup
/// `keeper-rs/src/main.rs` uses at startup, scoped to test output so a
/// failing `#[tokio::test]` shows the processor's structured log lines.
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Store {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<Store>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Store::default())),
        }
    }

    fn channel(store: &mut Store, name: &str) -> broadcast::Sender<String> {
        store
            .channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MockBackend {
    type PubSub = MockPubSub;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn setex(&self, key: &str, _ttl_secs: u64, value: &str) -> Result<()> {
        // TTL expiry is not modeled; tests only assert on presence/value.
        self.set(key, value).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut store = self.inner.lock().await;
        store.strings.remove(key);
        store.lists.remove(key);
        store.hashes.remove(key);
        store.sets.remove(key);
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64> {
        let mut store = self.inner.lock().await;
        let list = store.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len() as i64)
    }

    async fn llen(&self, key: &str) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .await
            .lists
            .get(key)
            .map(|l| l.len())
            .unwrap_or(0) as i64)
    }

    async fn lmove_left_right(&self, src: &str, dst: &str) -> Result<Option<String>> {
        // front = LEFT, back = RIGHT: pop the LEFT end of src, push onto the
        // RIGHT end of dst.
        let mut store = self.inner.lock().await;
        let popped = store.lists.get_mut(src).and_then(|l| l.pop_front());
        if let Some(ref value) = popped {
            store
                .lists
                .entry(dst.to_string())
                .or_default()
                .push_back(value.clone());
        }
        Ok(popped)
    }

    async fn lmove_right_left(&self, src: &str, dst: &str) -> Result<Option<String>> {
        // pop the RIGHT end of src, push onto the LEFT end of dst.
        let mut store = self.inner.lock().await;
        let popped = store.lists.get_mut(src).and_then(|l| l.pop_back());
        if let Some(ref value) = popped {
            store
                .lists
                .entry(dst.to_string())
                .or_default()
                .push_front(value.clone());
        }
        Ok(popped)
    }

    async fn lrem_one(&self, key: &str, value: &str) -> Result<i64> {
        let mut store = self.inner.lock().await;
        if let Some(list) = store.lists.get_mut(key) {
            if let Some(pos) = list.iter().position(|v| v == value) {
                list.remove(pos);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        if let Some(map) = self.inner.lock().await.hashes.get_mut(key) {
            map.remove(field);
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .hashes
            .get(key)
            .and_then(|m| m.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .inner
            .lock()
            .await
            .hashes
            .get(key)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .hashes
            .get(key)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .await
            .hashes
            .get(key)
            .map(|m| m.len())
            .unwrap_or(0) as i64)
    }

    async fn sadd(&self, key: &str, values: &[String]) -> Result<()> {
        let mut store = self.inner.lock().await;
        let set = store.sets.entry(key.to_string()).or_default();
        for v in values {
            set.insert(v.clone());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, values: &[String]) -> Result<()> {
        if let Some(set) = self.inner.lock().await.sets.get_mut(key) {
            for v in values {
                set.remove(v);
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut store = self.inner.lock().await;
        let tx = MockBackend::channel(&mut store, channel);
        let _ = tx.send(payload.to_string());
        Ok(())
    }

    async fn duplicate_pubsub(&self) -> Result<Self::PubSub> {
        Ok(MockPubSub {
            inner: self.inner.clone(),
            receivers: Vec::new(),
        })
    }

    fn is_connected(&self) -> bool {
        true
    }
}

pub struct MockPubSub {
    inner: Arc<Mutex<Store>>,
    receivers: Vec<broadcast::Receiver<String>>,
}

impl PubSubConn for MockPubSub {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        let mut store = self.inner.lock().await;
        let tx = MockBackend::channel(&mut store, channel);
        self.receivers.push(tx.subscribe());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<String> {
        use futures::future::select_all;
        loop {
            if self.receivers.is_empty() {
                return Err(crate::error::StoreError::Transient(
                    "no channels subscribed".to_string(),
                ));
            }
            let futs: Vec<_> = self
                .receivers
                .iter_mut()
                .map(|rx| Box::pin(rx.recv()))
                .collect();
            let (result, _, _) = select_all(futs).await;
            match result {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(crate::error::StoreError::Transient(
                        "pub/sub channel closed".to_string(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_push_move_confirm_round_trips() {
        let backend = MockBackend::new();
        backend.lpush("q", "a").await.unwrap();
        backend.lpush("q", "b").await.unwrap();
        assert_eq!(backend.llen("q").await.unwrap(), 2);

        // front = LEFT = most recently pushed ("b"), back = RIGHT = oldest
        // ("a"). `lmove_right_left` (src RIGHT -> dst LEFT) is what the
        // queue uses to pop FIFO order, so it must yield "a" first.
        let moved = backend.lmove_right_left("q", "qp").await.unwrap();
        assert_eq!(moved, Some("a".to_string()));
        assert_eq!(backend.llen("q").await.unwrap(), 1);
        assert_eq!(backend.llen("qp").await.unwrap(), 1);

        assert_eq!(backend.lrem_one("qp", "a").await.unwrap(), 1);
        assert_eq!(backend.llen("qp").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pubsub_delivers_published_payload() {
        let backend = MockBackend::new();
        let mut sub = backend.duplicate_pubsub().await.unwrap();
        sub.subscribe("chan").await.unwrap();
        backend.publish("chan", "hello").await.unwrap();
        let msg = sub.next_message().await.unwrap();
        assert_eq!(msg, "hello");
    }

    #[tokio::test]
    async fn hash_null_delete_semantics() {
        let backend = MockBackend::new();
        backend.hset("h", "f", "v").await.unwrap();
        assert_eq!(backend.hget("h", "f").await.unwrap(), Some("v".to_string()));
        backend.hdel("h", "f").await.unwrap();
        assert_eq!(backend.hget("h", "f").await.unwrap(), None);
    }
}
