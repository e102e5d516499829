//! Log-style broker abstraction: append-only streams with consumer-group
//! reads, acks, and approximate trimming. The pipeline talks to this trait,
//! never to Redis directly, so the at-least-once contract stays testable
//! without a live server.

mod redis_broker;

use async_trait::async_trait;
use onco_core::error::Result;
use std::collections::HashMap;

pub use redis_broker::RedisBroker;

/// One entry read back off a stream: its broker-assigned id and field map.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// The capabilities the ingestor, normalizer, and aggregator need from the
/// underlying stream store. Implementors must be safe for concurrent use
/// across tasks — callers hold this behind an `Arc<dyn Broker>`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append one entry to `stream`, trimming to approximately `maxlen`
    /// entries (bounded drift is acceptable — `approximate` controls
    /// whether the trim uses `~` semantics). Returns the new entry id.
    async fn append(
        &self,
        stream: &str,
        fields: &HashMap<String, String>,
        maxlen: usize,
        approximate: bool,
    ) -> Result<String>;

    /// Idempotently ensure `group` exists on `stream`, creating the stream
    /// itself if `mkstream` is set. A pre-existing group is not an error.
    async fn create_group(&self, stream: &str, group: &str, start: &str, mkstream: bool) -> Result<()>;

    /// Block up to `block_ms` for up to `count` new entries (`>`) delivered
    /// to `consumer` under `group`. A timeout with no entries is `Ok(vec![])`,
    /// not an error.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>>;

    /// Acknowledge `id` as consumed under `group`. Acking is the last step
    /// of the read→process→ack cycle; callers must not ack until every
    /// event derived from `id` has been durably published downstream.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()>;

    /// The most recent `count` entries on `stream`, newest first. Used by
    /// contract-verification tooling, not by the live pipeline.
    async fn revrange(&self, stream: &str, count: usize) -> Result<Vec<StreamEntry>>;
}
