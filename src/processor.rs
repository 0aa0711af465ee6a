//! The storage processor (spec.md §4.C): the singleton-guarded run-loop that
//! drains the reliable queue and applies each mutation. Modeled on
//! `keeper-rs/src/main.rs`'s long-running poll loop — acquire the exclusive
//! lock, recover anything a prior crash left stranded, then loop
//! pop/apply/confirm with a bounded back-off on transient trouble and an
//! immediate halt on anything fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::backend::Backend;
use crate::codec;
use crate::config::StoreConfig;
use crate::diff::structural_diff;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::lock::SingletonLock;
use crate::message::{Message, MutationKind};
use crate::queue::ReliableQueue;
use crate::state::{DiffMessage, StateVersion};

pub struct StorageProcessor<B: Backend> {
    backend: B,
    config: StoreConfig,
    queue: ReliableQueue<B>,
    stopping: Arc<AtomicBool>,
}

impl<B: Backend> StorageProcessor<B> {
    pub fn new(backend: B, config: StoreConfig) -> Self {
        let queue = ReliableQueue::new(backend.clone(), &config.namespace, &config.qid);
        Self {
            backend,
            config,
            queue,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn queue(&self) -> &ReliableQueue<B> {
        &self.queue
    }

    /// Cooperative shutdown: wakes a blocked `wait_for_signal` and stops the
    /// loop at its next check.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.queue.stop();
    }

    /// Acquire the singleton lock, recover any stranded in-flight message,
    /// then run until stopped or a fatal error occurs.
    pub async fn run(&self) -> Result<()> {
        let lock = SingletonLock::acquire(self.backend.clone(), &self.config).await?;
        let heartbeat = lock.spawn_heartbeat(self.config.lock_heartbeat, self.stopping.clone());

        self.queue.recover_stuck().await?;
        let result = self.run_loop(&lock).await;

        self.stopping.store(true, Ordering::SeqCst);
        heartbeat.abort();
        let _ = lock.release().await;
        result
    }

    async fn run_loop(&self, lock: &SingletonLock<B>) -> Result<()> {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }
            lock.verify_owned().await?;

            match self.queue.pop_next().await {
                Ok(Some(popped)) => match self.apply(&popped.message).await {
                    Ok(()) => self.queue.confirm(&popped.handle).await?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to apply message; leaving unconfirmed for retry");
                        tokio::time::sleep(self.config.backoff_poll_interval).await;
                    }
                },
                Ok(None) => match self.queue.wait_for_signal(self.config.max_wait_signal).await {
                    Ok(()) => {}
                    Err(StoreError::Cancelled) => return Ok(()),
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "transient error polling queue; backing off");
                    tokio::time::sleep(self.config.backoff_duration).await;
                }
            }
        }
    }

    /// Apply one message's mutation. An `Unknown` type is logged and treated
    /// as applied (forward-compatibility path); anything else is dispatched
    /// by its decoded `meta`.
    pub async fn apply(&self, message: &Message) -> Result<()> {
        match message.kind() {
            MutationKind::WriteSimpleValue(meta) => {
                let key = keys::value_key(&self.config.namespace, &meta.key);
                self.backend.set(&key, &meta.value).await
            }
            MutationKind::WriteStateObject(meta) => self.write_state_object(&meta.key, &meta.value).await,
            MutationKind::WriteHashmapValue(meta) => {
                let key = keys::map_key(&self.config.namespace, &meta.key);
                match meta.value {
                    Some(ref v) => self.backend.hset(&key, &meta.field, v).await,
                    None => self.backend.hdel(&key, &meta.field).await,
                }
            }
            MutationKind::AddStringsToSet(meta) => {
                let key = keys::set_key(&self.config.namespace, &meta.key);
                self.backend.sadd(&key, &meta.values).await
            }
            MutationKind::RemoveStringsFromSet(meta) => {
                let key = keys::set_key(&self.config.namespace, &meta.key);
                self.backend.srem(&key, &meta.values).await
            }
            MutationKind::Unknown(msg_type) => {
                tracing::warn!(msg_type = %msg_type, "unknown message type; treating as applied");
                Ok(())
            }
        }
    }

    /// The versioned state-write protocol: fetch the current snapshot,
    /// diff against the incoming value, persist the new snapshot, then
    /// publish the delta — in that order, so a subscriber never observes a
    /// delta for a snapshot it can't yet read. Writing `{}` deletes the
    /// record and resets its version chain.
    async fn write_state_object(&self, state_key: &str, raw_value: &str) -> Result<()> {
        let key = keys::state_key(&self.config.namespace, state_key);
        let delta_channel = keys::state_delta_channel(&self.config.namespace, state_key);
        let new_value: Value = codec::decode(raw_value)?;

        let current: Option<StateVersion<Value>> = match self.backend.get(&key).await? {
            Some(raw) => Some(codec::decode(&raw)?),
            None => None,
        };
        let old_value = current.as_ref().map(|sv| sv.value.clone()).unwrap_or(json!({}));
        let old_version = current.as_ref().map(|sv| sv.version).unwrap_or(0);

        let diff = structural_diff(&old_value, &new_value);
        let delta = DiffMessage::new(old_version, serde_json::to_value(diff)?);

        if new_value == json!({}) {
            self.backend.del(&key).await?;
        } else {
            let snapshot = StateVersion::new(old_version + 1, new_value);
            self.backend.set(&key, &codec::encode(&snapshot)?).await?;
        }

        self.backend
            .publish(&delta_channel, &codec::encode(&delta)?)
            .await?;
        Ok(())
    }
}
