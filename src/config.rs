use std::time::Duration;

use crate::error::{Result, StoreError};

/// Namespace, queue id, and backend address, plus the timing knobs named in
/// the design (lock TTL/heartbeat, retry bound, run-loop hang/back-off).
/// Built through a validating constructor the way `KeeperConfig` validates
/// its CLI+deployment inputs before a keeper ever starts its run-loop.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub namespace: String,
    pub qid: String,
    pub host: String,
    pub port: u16,

    pub lock_ttl: Duration,
    pub lock_heartbeat: Duration,
    pub lock_max_attempts: u32,
    pub lock_attempt_interval: Duration,
    pub lock_verify_delay: Duration,

    pub command_retry_limit: u32,
    pub command_retry_gap: Duration,

    pub max_wait_signal: Duration,
    pub backoff_duration: Duration,
    pub backoff_poll_interval: Duration,
}

impl StoreConfig {
    pub fn new(namespace: impl Into<String>, qid: impl Into<String>, host: impl Into<String>, port: u16) -> Result<Self> {
        let namespace = namespace.into();
        let qid = qid.into();
        let host = host.into();

        if namespace.trim().is_empty() {
            return Err(StoreError::Config("namespace must not be empty".into()));
        }
        if namespace.contains('-') {
            // Namespace is used as a literal prefix ahead of our own `-`
            // separators (e.g. `<ns>-Q-<qid>`); a hyphen in the namespace
            // itself would make key parsing ambiguous for any tooling that
            // splits on `-`, so we warn rather than silently accept it.
            tracing::warn!(namespace, "namespace contains '-'; key prefixes may be ambiguous to split on");
        }
        if qid.trim().is_empty() {
            return Err(StoreError::Config("qid must not be empty".into()));
        }
        if host.trim().is_empty() {
            return Err(StoreError::Config("host must not be empty".into()));
        }

        Ok(Self {
            namespace,
            qid,
            host,
            port,
            lock_ttl: Duration::from_secs(60),
            lock_heartbeat: Duration::from_secs(30),
            lock_max_attempts: 10,
            lock_attempt_interval: Duration::from_secs(10),
            lock_verify_delay: Duration::from_secs(5),
            command_retry_limit: 10,
            command_retry_gap: Duration::from_secs(2),
            max_wait_signal: Duration::from_secs(300),
            backoff_duration: Duration::from_secs(300),
            backoff_poll_interval: Duration::from_millis(500),
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}
