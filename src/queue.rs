//! The reliable queue (spec.md §4.B): a two-list move-and-confirm pattern
//! giving at-least-once delivery over a plain Redis list. `push` puts a
//! message on the head of the main list; `pop_next` atomically moves the
//! tail element into a processing list (so a crash between pop and confirm
//! leaves the message recoverable, never lost); `confirm` removes it from
//! processing once applied. `recover_stuck` drains anything left in
//! processing back onto the main queue at startup, the way a prior
//! processor's crash is detected and repaired.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::message::{Message, MessageWithHandle};

pub struct ReliableQueue<B: Backend> {
    backend: B,
    qid: String,
    queue_key: String,
    processing_key: String,
    channel: String,
    cancel: Arc<Notify>,
}

impl<B: Backend> ReliableQueue<B> {
    pub fn new(backend: B, namespace: &str, qid: &str) -> Self {
        Self {
            backend,
            qid: qid.to_string(),
            queue_key: keys::queue_key(namespace, qid),
            processing_key: keys::processing_key(namespace, qid),
            channel: keys::queue_channel(namespace, qid),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Wake any in-progress `wait_for_signal` call with a cancellation error,
    /// for cooperative shutdown of the processor run-loop.
    pub fn stop(&self) {
        self.cancel.notify_waiters();
    }

    /// Move anything still sitting in the processing list back onto the main
    /// queue, oldest first, logging a warning per message moved. Safe to
    /// call any time: an empty processing list is a no-op.
    pub async fn recover_stuck(&self) -> Result<()> {
        self.drain_processing_into_queue().await
    }

    async fn drain_processing_into_queue(&self) -> Result<()> {
        loop {
            if self.backend.llen(&self.processing_key).await? == 0 {
                return Ok(());
            }
            match self
                .backend
                .lmove_right_left(&self.processing_key, &self.queue_key)
                .await?
            {
                Some(_) => {
                    tracing::warn!(qid = %self.qid, "recovering stranded message from processing list");
                    continue;
                }
                None => return Ok(()),
            }
        }
    }

    pub async fn push(&self, message: &Message) -> Result<()> {
        let wire = message.to_wire()?;
        self.backend.lpush(&self.queue_key, &wire).await?;
        self.backend
            .publish(&self.channel, keys::PUSH_SIGNAL)
            .await?;
        Ok(())
    }

    /// Atomically move the oldest message into the processing list and
    /// return it paired with the handle `confirm` must present later. First
    /// drains anything still stranded in the processing list back onto the
    /// queue — a message left unconfirmed by a failed `apply` (or a prior
    /// crash) is recovered on the very next `pop_next`, not just at startup.
    pub async fn pop_next(&self) -> Result<Option<MessageWithHandle>> {
        self.drain_processing_into_queue().await?;

        let moved = self
            .backend
            .lmove_right_left(&self.queue_key, &self.processing_key)
            .await?;
        match moved {
            Some(wire) => {
                let message = Message::from_wire(&wire)?;
                Ok(Some(MessageWithHandle { message, handle: wire }))
            }
            None => Ok(None),
        }
    }

    /// Remove a successfully-applied message from the processing list.
    /// Exactly one element must be removed; anything else means either a
    /// double-confirm or a second processor racing on the same queue.
    pub async fn confirm(&self, handle: &str) -> Result<()> {
        let removed = self.backend.lrem_one(&self.processing_key, handle).await?;
        if removed != 1 {
            return Err(StoreError::Inconsistent {
                qid: self.qid.clone(),
                removed,
            });
        }
        Ok(())
    }

    /// Block until a push is signalled, `max_wait` elapses, or `stop` is
    /// called — whichever comes first. Callers treat a plain timeout and a
    /// delivered signal the same way (go check the queue again); only
    /// cancellation is distinguished, via `StoreError::Cancelled`.
    pub async fn wait_for_signal(&self, max_wait: Duration) -> Result<()> {
        let mut sub = self.backend.duplicate_pubsub().await?;
        sub.subscribe(&self.channel).await?;

        tokio::select! {
            _ = self.cancel.notified() => Err(StoreError::Cancelled),
            result = sub.next_message() => result.map(|_| ()),
            _ = tokio::time::sleep(max_wait) => Ok(()),
        }
    }

    pub async fn delete_queue(&self) -> Result<()> {
        self.backend.del(&self.queue_key).await?;
        self.backend.del(&self.processing_key).await?;
        Ok(())
    }

    pub async fn size(&self) -> Result<i64> {
        self.backend.llen(&self.queue_key).await
    }
}
