//! Reliable, write-serialized, versioned key-value state store over a
//! Redis-like backend.
//!
//! Producers enqueue mutation intents onto a [`queue::ReliableQueue`]; a
//! singleton [`processor::StorageProcessor`] drains it, applies each
//! mutation, and — for versioned state objects — publishes a structural
//! diff. Readers use [`reader::StateReader`] for direct lookups and for
//! subscribing to a key's live delta stream.

pub mod backend;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod keys;
pub mod lock;
pub mod message;
pub mod processor;
pub mod queue;
pub mod reader;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{Backend, PubSubConn, RedisBackend};
pub use config::StoreConfig;
pub use diff::{structural_diff, DiffPayload};
pub use error::{Result, StoreError};
pub use message::{Message, MutationKind};
pub use processor::StorageProcessor;
pub use queue::ReliableQueue;
pub use reader::StateReader;
pub use state::{DiffMessage, StateVersion};
