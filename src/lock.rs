//! Cluster-wide singleton lock (spec.md §3/§4.C/§5): a TTL-heartbeat lease
//! keyed by namespace, generalizing `keeper-rs/src/main.rs`'s single-process
//! `fs2` file lock to a Redis-backed lease any number of processes can race
//! for. Acquisition first politely waits out any holder it can see, then
//! falls back to write-then-verify rather than an atomic compare-and-set —
//! `SETEX`, wait out the verification delay, then `GET` back the owner —
//! matching the design's explicit 5s post-write verification step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::keys;

pub struct SingletonLock<B: Backend> {
    backend: B,
    namespace: String,
    key: String,
    instance_id: String,
    ttl: Duration,
}

impl<B: Backend> SingletonLock<B> {
    /// Race for the lock: up to `lock_max_attempts`, `lock_attempt_interval`
    /// apart. Each attempt first reads the key; if it already names someone
    /// else, we wait rather than stomp a live lease and consume the attempt.
    /// Only once the key looks free do we write our instance id with a fresh
    /// TTL, wait `lock_verify_delay`, then read it back — if it still names
    /// us, the lease is ours; if another instance has since overwritten it,
    /// we lost the race and retry.
    pub async fn acquire(backend: B, config: &StoreConfig) -> Result<Self> {
        let key = keys::lock_key(&config.namespace);
        let instance_id = Uuid::new_v4().to_string();

        for attempt in 1..=config.lock_max_attempts {
            if let Some(holder) = backend.get(&key).await? {
                tracing::warn!(
                    namespace = %config.namespace,
                    attempt,
                    holder = %holder,
                    "lock currently held; waiting before attempting to acquire"
                );
                if attempt < config.lock_max_attempts {
                    tokio::time::sleep(config.lock_attempt_interval).await;
                }
                continue;
            }

            backend
                .setex(&key, config.lock_ttl.as_secs(), &instance_id)
                .await?;
            tokio::time::sleep(config.lock_verify_delay).await;

            let owner = backend.get(&key).await?;
            if owner.as_deref() == Some(instance_id.as_str()) {
                tracing::info!(namespace = %config.namespace, instance_id = %instance_id, attempt, "singleton lock acquired");
                return Ok(Self {
                    backend,
                    namespace: config.namespace.clone(),
                    key,
                    instance_id,
                    ttl: config.lock_ttl,
                });
            }

            tracing::warn!(
                namespace = %config.namespace,
                attempt,
                owner = ?owner,
                "lost singleton lock race; retrying"
            );
            if attempt < config.lock_max_attempts {
                tokio::time::sleep(config.lock_attempt_interval).await;
            }
        }

        Err(StoreError::LockUnavailable {
            namespace: config.namespace.clone(),
            attempts: config.lock_max_attempts,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Re-assert ownership without waiting — refresh the TTL so the lease
    /// doesn't expire out from under a live process.
    pub async fn heartbeat(&self) -> Result<()> {
        self.backend
            .setex(&self.key, self.ttl.as_secs(), &self.instance_id)
            .await
    }

    /// Confirm the stored owner still matches us. Called at points where a
    /// stale or stolen lease would be a correctness problem (spec.md's
    /// lock-violation case), not just on a schedule.
    pub async fn verify_owned(&self) -> Result<()> {
        let owner = self.backend.get(&self.key).await?;
        if owner.as_deref() == Some(self.instance_id.as_str()) {
            Ok(())
        } else {
            Err(StoreError::LockViolation {
                namespace: self.namespace.clone(),
                expected: self.instance_id.clone(),
                found: owner,
            })
        }
    }

    /// Best-effort release. Only deletes the key if we still appear to own
    /// it, so a process that already lost the lease can't clobber whoever
    /// holds it now.
    pub async fn release(&self) -> Result<()> {
        if self.verify_owned().await.is_ok() {
            self.backend.del(&self.key).await?;
        }
        Ok(())
    }

    /// Spawn a background task that refreshes the lease's TTL every
    /// `interval` until `stopping` is set. Runs independently of the
    /// `SingletonLock` value itself (the task owns its own clone of the
    /// backend and key/instance strings), so the lock can be borrowed
    /// elsewhere while the heartbeat keeps it alive.
    pub fn spawn_heartbeat(
        &self,
        interval: Duration,
        stopping: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let backend = self.backend.clone();
        let key = self.key.clone();
        let instance_id = self.instance_id.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            loop {
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(interval).await;
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(err) = backend.setex(&key, ttl.as_secs(), &instance_id).await {
                    tracing::error!(error = %err, "lock heartbeat failed");
                }
            }
        })
    }
}
