//! Redis-streams-backed [`crate::Broker`]. `XADD`/`XGROUP CREATE`/
//! `XREADGROUP`/`XACK`/`XREVRANGE` map directly onto the trait's five ops.

use crate::{Broker, StreamEntry};
use async_trait::async_trait;
use onco_core::error::{Error, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;

fn broker_err(e: RedisError) -> Error {
    Error::Broker(e.to_string())
}

/// `BUSYGROUP` is Redis's way of saying "the group already exists" — that
/// is the success case for an idempotent `create_group`, not a failure.
fn is_busygroup(e: &RedisError) -> bool {
    e.code() == Some("BUSYGROUP")
}

pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`) using a
    /// `ConnectionManager`, which reconnects transparently and is safe to
    /// share across tasks without an external mutex.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(broker_err)?;
        let conn = client.get_connection_manager().await.map_err(broker_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn append(
        &self,
        stream: &str,
        fields: &HashMap<String, String>,
        maxlen: usize,
        approximate: bool,
    ) -> Result<String> {
        let maxlen = if approximate {
            StreamMaxlen::Approx(maxlen)
        } else {
            StreamMaxlen::Equals(maxlen)
        };
        let items: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd_maxlen(stream, maxlen, "*", &items)
            .await
            .map_err(broker_err)?;
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str, start: &str, mkstream: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: std::result::Result<(), RedisError> = if mkstream {
            conn.xgroup_create_mkstream(stream, group, start).await
        } else {
            conn.xgroup_create(stream, group, start).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_busygroup(&e) => Ok(()),
            Err(e) => Err(broker_err(e)),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>> {
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms as usize);
        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(broker_err)?;

        let mut entries = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let mut fields = HashMap::with_capacity(id.map.len());
                for (k, v) in id.map {
                    let value: String = redis::from_redis_value(&v).unwrap_or_default();
                    fields.insert(k, value);
                }
                entries.push(StreamEntry { id: id.id, fields });
            }
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await.map_err(broker_err)?;
        Ok(())
    }

    async fn revrange(&self, stream: &str, count: usize) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrevrange_count(stream, "+", "-", count)
            .await
            .map_err(broker_err)?;

        let mut entries = Vec::with_capacity(reply.ids.len());
        for id in reply.ids {
            let mut fields = HashMap::with_capacity(id.map.len());
            for (k, v) in id.map {
                let value: String = redis::from_redis_value(&v).unwrap_or_default();
                fields.insert(k, value);
            }
            entries.push(StreamEntry { id: id.id, fields });
        }
        Ok(entries)
    }
}
