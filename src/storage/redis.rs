// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend for [`KvStore`].
//!
//! Plain reads and batches go through a shared [`ConnectionManager`].
//! WATCH state lives on the connection, so every [`WatchSession`] opens
//! its own dedicated connection and drops it after EXEC/UNWATCH:
//!
//! ```text
//! watch()  → new connection → WATCH k1 k2
//! reads    → same connection
//! exec()   → MULTI … EXEC   → nil reply = conflict
//! ```
//!
//! Store errors are returned to the caller untouched; only the initial
//! connect is retried.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, Pipeline};
use tracing::{debug, info};

use super::traits::{ExecOutcome, KvStore, Op, StorageError, WatchSession};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "shop:" → "shop:market:")
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use storefront_engine::storage::redis::RedisStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "shop:market:", "shop:inventory:alice"
    /// let store = RedisStore::with_prefix("redis://localhost", Some("shop:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(connection_string))]
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)?;

        // Fast-fail on bad config rather than hanging at startup
        let connection = retry("redis_connect", &RetryConfig::startup(), || {
            let client = client.clone();
            async move { ConnectionManager::new(client).await }
        })
        .await?;

        info!("Redis store connected");
        Ok(Self {
            client,
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        prefixed(&self.prefix, key)
    }

    fn build_pipeline(&self, ops: &[Op], atomic: bool) -> Pipeline {
        let mut pipeline = redis::pipe();
        if atomic {
            pipeline.atomic();
        }
        for op in ops {
            push_op(&mut pipeline, op, &self.prefix);
        }
        pipeline
    }
}

#[inline]
fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}", prefix, key)
    }
}

/// Translate one [`Op`] into its Redis command. Replies are ignored;
/// callers only care whether the batch as a whole went through.
fn push_op(pipeline: &mut Pipeline, op: &Op, prefix: &str) {
    match op {
        Op::Set { key, value } => {
            pipeline.cmd("SET").arg(prefixed(prefix, key)).arg(value).ignore();
        }
        Op::SetEx { key, value, ttl_secs } => {
            pipeline.cmd("SETEX").arg(prefixed(prefix, key)).arg(*ttl_secs).arg(value).ignore();
        }
        Op::Del { keys } => {
            if !keys.is_empty() {
                let keys: Vec<String> = keys.iter().map(|k| prefixed(prefix, k)).collect();
                pipeline.cmd("DEL").arg(keys).ignore();
            }
        }
        Op::HSet { key, field, value } => {
            pipeline.cmd("HSET").arg(prefixed(prefix, key)).arg(field).arg(value).ignore();
        }
        Op::HDel { key, fields } => {
            if !fields.is_empty() {
                pipeline.cmd("HDEL").arg(prefixed(prefix, key)).arg(fields).ignore();
            }
        }
        Op::HIncrBy { key, field, delta } => {
            pipeline.cmd("HINCRBY").arg(prefixed(prefix, key)).arg(field).arg(*delta).ignore();
        }
        Op::SAdd { key, member } => {
            pipeline.cmd("SADD").arg(prefixed(prefix, key)).arg(member).ignore();
        }
        Op::SRem { key, member } => {
            pipeline.cmd("SREM").arg(prefixed(prefix, key)).arg(member).ignore();
        }
        Op::ZAdd { key, member, score } => {
            pipeline.cmd("ZADD").arg(prefixed(prefix, key)).arg(*score).arg(member).ignore();
        }
        Op::ZRem { key, members } => {
            if !members.is_empty() {
                pipeline.cmd("ZREM").arg(prefixed(prefix, key)).arg(members).ignore();
            }
        }
        Op::ZIncrBy { key, member, delta } => {
            pipeline.cmd("ZINCRBY").arg(prefixed(prefix, key)).arg(*delta).arg(member).ignore();
        }
        Op::ZRemRangeByRank { key, start, stop } => {
            pipeline
                .cmd("ZREMRANGEBYRANK")
                .arg(prefixed(prefix, key))
                .arg(*start)
                .arg(*stop)
                .ignore();
        }
        Op::ZInterStore { dest, sources } => {
            let cmd = pipeline
                .cmd("ZINTERSTORE")
                .arg(prefixed(prefix, dest))
                .arg(sources.len());
            for (source, _) in sources {
                cmd.arg(prefixed(prefix, source));
            }
            cmd.arg("WEIGHTS");
            for (_, weight) in sources {
                cmd.arg(*weight);
            }
            cmd.ignore();
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(self.prefixed_key(key)).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.hget(self.prefixed_key(key), field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.hgetall(self.prefixed_key(key)).await?)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.sismember(self.prefixed_key(key), member).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = self.connection.clone();
        let mut members: Vec<String> = conn.smembers(self.prefixed_key(key)).await?;
        members.sort();
        Ok(members)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.zcard(self.prefixed_key(key)).await?)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.zscore(self.prefixed_key(key), member).await?)
    }

    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.zrank(self.prefixed_key(key), member).await?)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StorageError> {
        let mut conn = self.connection.clone();
        Ok(conn.zrange_withscores(self.prefixed_key(key), start, stop).await?)
    }

    async fn watch(&self, keys: &[String]) -> Result<Box<dyn WatchSession>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let prefixed_keys: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        redis::cmd("WATCH")
            .arg(&prefixed_keys)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(keys = ?prefixed_keys, "WATCH established");
        Ok(Box::new(RedisWatch {
            conn,
            prefix: self.prefix.clone(),
        }))
    }

    async fn exec_atomic(&self, ops: Vec<Op>) -> Result<(), StorageError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        self.build_pipeline(&ops, true)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pipeline(&self, ops: Vec<Op>) -> Result<(), StorageError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        self.build_pipeline(&ops, false)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// A dedicated connection holding a WATCH.
struct RedisWatch {
    conn: MultiplexedConnection,
    prefix: String,
}

#[async_trait]
impl WatchSession for RedisWatch {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.conn.get(prefixed(&self.prefix, key)).await?)
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        Ok(self.conn.hget(prefixed(&self.prefix, key), field).await?)
    }

    async fn sismember(&mut self, key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self.conn.sismember(prefixed(&self.prefix, key), member).await?)
    }

    async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        Ok(self.conn.zscore(prefixed(&self.prefix, key), member).await?)
    }

    async fn exec(self: Box<Self>, ops: Vec<Op>) -> Result<ExecOutcome, StorageError> {
        let mut this = self;
        let mut pipeline = redis::pipe();
        pipeline.atomic();
        if ops.is_empty() {
            // An empty pipeline is never sent; PING keeps MULTI/EXEC on the wire
            pipeline.cmd("PING").ignore();
        }
        for op in &ops {
            push_op(&mut pipeline, op, &this.prefix);
        }

        let reply: redis::Value = pipeline.query_async(&mut this.conn).await?;
        if matches!(reply, redis::Value::Nil) {
            debug!("EXEC aborted by watched key change");
            Ok(ExecOutcome::Conflict)
        } else {
            Ok(ExecOutcome::Applied)
        }
    }

    async fn unwatch(self: Box<Self>) -> Result<(), StorageError> {
        let mut this = self;
        redis::cmd("UNWATCH").query_async::<()>(&mut this.conn).await?;
        Ok(())
    }
}
