use thiserror::Error;

/// Error taxonomy for the store, matching the operator-facing categories in
/// the design's error-handling section: transient backend trouble the
/// adapter/processor retry past, queue inconsistencies and lock violations
/// that are fatal to the current cycle (or process), and the two purely
/// local conditions (schema drift, cancellation) that never need a restart.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection refused, command timeout, or any other I/O-level hiccup
    /// talking to the backend. Recovered by retrying the whole operation.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// `confirm`'s `LREM` returned something other than 1 — either a
    /// double-confirm or a second processor holding the same queue.
    #[error("queue inconsistency on qid={qid}: expected to remove exactly 1 handle, removed {removed}")]
    Inconsistent { qid: String, removed: i64 },

    /// Startup re-read of the singleton lock found a different owner.
    #[error("lock violation for namespace {namespace}: expected owner {expected}, found {found:?}")]
    LockViolation {
        namespace: String,
        expected: String,
        found: Option<String>,
    },

    /// Exceeded the maximum number of singleton-lock acquisition attempts.
    #[error("failed to acquire singleton lock for namespace {namespace} after {attempts} attempts")]
    LockUnavailable { namespace: String, attempts: u32 },

    /// A message body or stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A delta was observed whose `from_version` did not match the
    /// subscriber's current version. Recovered locally (warn + discard);
    /// the caller may resubscribe for a fresh snapshot.
    #[error("subscriber drift on key {key}: expected fromVersion={expected}, got {got}")]
    SubscriberDrift { key: String, expected: i64, got: i64 },

    /// Reader asked for a versioned state key that has never been written
    /// (or has been deleted back to `{}`).
    #[error("missing state object for key {0}")]
    MissingState(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cooperative cancellation of a wait/subscribe loop.
    #[error("cancelled")]
    Cancelled,

    /// The subscriber was explicitly unsubscribed; delivered once through
    /// `on_error` so callers can distinguish it from a real failure.
    #[error("unsubscribed")]
    Unsubscribed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the processor run-loop should treat this as recoverable via
    /// its 300s back-off-and-retry cycle, versus escalating further.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Whether this is one of the two categories the design calls fatal:
    /// queue inconsistency and lock violation. Both collapse a run by
    /// entering a long back-off (or, for the startup lock check, aborting).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Inconsistent { .. }
                | StoreError::LockViolation { .. }
                | StoreError::LockUnavailable { .. }
        )
    }
}
