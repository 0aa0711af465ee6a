//! Read-side API (spec.md §4.E): direct accessors for every key pattern,
//! plus `fetch_state_and_listen` implementing the subscribe protocol —
//! subscribe before reading the snapshot (so no delta published in between
//! is missed), emit the initial snapshot, then apply each delta in order.
//! A version mismatch or a vanished key is reported through `on_error`
//! rather than dropped silently, and triggers a resync (fresh subscribe +
//! fresh snapshot) instead of tearing the listener down.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::backend::{Backend, PubSubConn};
use crate::codec;
use crate::diff::{apply_diff, DiffPayload};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::state::{DiffMessage, StateVersion};

pub struct StateReader<B: Backend> {
    backend: B,
    namespace: String,
    stop: Arc<Notify>,
}

impl<B: Backend> StateReader<B> {
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
            stop: Arc::new(Notify::new()),
        }
    }

    /// Unsubscribe any in-progress `fetch_state_and_listen` call.
    pub fn stop(&self) {
        self.stop.notify_waiters();
    }

    pub async fn read_value(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(&keys::value_key(&self.namespace, key)).await
    }

    pub async fn read_hashmap_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.backend
            .hget(&keys::map_key(&self.namespace, key), field)
            .await
    }

    pub async fn read_hashmap_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.backend.hgetall(&keys::map_key(&self.namespace, key)).await
    }

    pub async fn read_set(&self, key: &str) -> Result<Vec<String>> {
        self.backend.smembers(&keys::set_key(&self.namespace, key)).await
    }

    pub async fn read_state(&self, key: &str) -> Result<Option<StateVersion<Value>>> {
        match self.backend.get(&keys::state_key(&self.namespace, key)).await? {
            Some(raw) => Ok(Some(codec::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Subscribe to `key`'s delta channel before reading its snapshot (so no
    /// delta published in between is missed), hand the snapshot to
    /// `on_full`, then apply each subsequent delta in place and hand it to
    /// `on_delta` — the state after a delta is reconstructed from the delta
    /// itself (`apply_diff`) rather than by re-reading the backend, so two
    /// writes landing between two deltas can never be collapsed into one
    /// observed version. A version mismatch or a vanished key goes to
    /// `on_error` and triggers a resync (fresh subscribe + fresh snapshot)
    /// rather than tearing the listener down.
    pub async fn fetch_state_and_listen<F, D, E>(
        &self,
        key: &str,
        mut on_full: F,
        mut on_delta: D,
        mut on_error: E,
    ) -> Result<()>
    where
        F: FnMut(StateVersion<Value>),
        D: FnMut(DiffMessage),
        E: FnMut(StoreError),
    {
        let state_key = keys::state_key(&self.namespace, key);
        let delta_channel = keys::state_delta_channel(&self.namespace, key);

        loop {
            let mut sub = self.backend.duplicate_pubsub().await?;
            sub.subscribe(&delta_channel).await?;

            let mut current = match self.backend.get(&state_key).await? {
                Some(raw) => codec::decode::<StateVersion<Value>>(&raw)?,
                None => {
                    on_error(StoreError::MissingState(key.to_string()));
                    StateVersion::new(0, json!({}))
                }
            };
            on_full(current.clone());

            loop {
                let next = tokio::select! {
                    _ = self.stop.notified() => {
                        on_error(StoreError::Unsubscribed);
                        return Ok(());
                    }
                    msg = sub.next_message() => msg?,
                };

                let delta: DiffMessage = codec::decode(&next)?;
                if delta.from_version != current.version {
                    on_error(StoreError::SubscriberDrift {
                        key: key.to_string(),
                        expected: current.version,
                        got: delta.from_version,
                    });
                    break; // resync: fresh subscribe + fresh snapshot
                }

                let payload: DiffPayload = serde_json::from_value(delta.delta_payload.clone())?;
                let new_value = apply_diff(&current.value, &payload);
                current = StateVersion {
                    version: delta.to_version,
                    written_at: delta.written_at,
                    value: new_value,
                };
                on_delta(delta);
                on_full(current.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::message::Message;
    use crate::processor::StorageProcessor;
    use crate::testutil::MockBackend;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn read_value_reflects_writes() {
        let backend = MockBackend::new();
        backend.set(&keys::value_key("ns", "k"), "v").await.unwrap();
        let reader = StateReader::new(backend, "ns");
        assert_eq!(reader.read_value("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn fetch_state_and_listen_delivers_initial_snapshot_then_updates() {
        let backend = MockBackend::new();
        let mut cfg = StoreConfig::new("ns", "main", "localhost", 6379).unwrap();
        cfg.lock_verify_delay = Duration::from_millis(1);
        cfg.lock_attempt_interval = Duration::from_millis(1);
        let processor = StorageProcessor::new(backend.clone(), cfg);

        processor
            .apply(&Message::new(
                "WRITE_STATE_OBJECT",
                json!({"key": "obj", "value": serde_json::to_string(&json!({"stage": 1})).unwrap()}),
            ))
            .await
            .unwrap();

        let reader = StateReader::new(backend.clone(), "ns");
        let seen_full = Arc::new(StdMutex::new(Vec::new()));
        let seen_full2 = seen_full.clone();
        let seen_deltas = Arc::new(StdMutex::new(Vec::new()));
        let seen_deltas2 = seen_deltas.clone();

        let listener = {
            let reader = reader.clone_for_test();
            tokio::spawn(async move {
                reader
                    .fetch_state_and_listen(
                        "obj",
                        move |sv| seen_full2.lock().unwrap().push(sv.version),
                        move |delta| seen_deltas2.lock().unwrap().push((delta.from_version, delta.to_version)),
                        |_| {},
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        processor
            .apply(&Message::new(
                "WRITE_STATE_OBJECT",
                json!({"key": "obj", "value": serde_json::to_string(&json!({"stage": 2})).unwrap()}),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        reader.stop();
        listener.await.unwrap().unwrap();

        assert_eq!(*seen_full.lock().unwrap(), vec![1, 2]);
        assert_eq!(*seen_deltas.lock().unwrap(), vec![(1, 2)]);
    }

    impl<B: Backend + Clone> StateReader<B> {
        fn clone_for_test(&self) -> Self {
            Self {
                backend: self.backend.clone(),
                namespace: self.namespace.clone(),
                stop: self.stop.clone(),
            }
        }
    }
}
