// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Wrong value type at '{key}': expected {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("Data corruption detected at '{key}': {reason}")]
    Corruption { key: String, reason: String },
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        StorageError::Backend(e.to_string())
    }
}

/// A single write inside an atomic or pipelined batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Set { key: String, value: String },
    SetEx { key: String, value: String, ttl_secs: u64 },
    Del { keys: Vec<String> },
    HSet { key: String, field: String, value: String },
    HDel { key: String, fields: Vec<String> },
    HIncrBy { key: String, field: String, delta: i64 },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    ZAdd { key: String, member: String, score: f64 },
    ZRem { key: String, members: Vec<String> },
    ZIncrBy { key: String, member: String, delta: f64 },
    ZRemRangeByRank { key: String, start: isize, stop: isize },
    /// ZINTERSTORE with per-source weights and SUM aggregation.
    ZInterStore { dest: String, sources: Vec<(String, f64)> },
}

impl Op {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Op::Set { key: key.into(), value: value.into() }
    }

    pub fn set_ex(key: impl Into<String>, value: impl Into<String>, ttl_secs: u64) -> Self {
        Op::SetEx { key: key.into(), value: value.into(), ttl_secs }
    }

    pub fn del(keys: Vec<String>) -> Self {
        Op::Del { keys }
    }

    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Op::HSet { key: key.into(), field: field.into(), value: value.into() }
    }

    pub fn hdel(key: impl Into<String>, fields: Vec<String>) -> Self {
        Op::HDel { key: key.into(), fields }
    }

    pub fn hincr_by(key: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Op::HIncrBy { key: key.into(), field: field.into(), delta }
    }

    pub fn sadd(key: impl Into<String>, member: impl Into<String>) -> Self {
        Op::SAdd { key: key.into(), member: member.into() }
    }

    pub fn srem(key: impl Into<String>, member: impl Into<String>) -> Self {
        Op::SRem { key: key.into(), member: member.into() }
    }

    pub fn zadd(key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        Op::ZAdd { key: key.into(), member: member.into(), score }
    }

    pub fn zrem(key: impl Into<String>, members: Vec<String>) -> Self {
        Op::ZRem { key: key.into(), members }
    }

    pub fn zincr_by(key: impl Into<String>, member: impl Into<String>, delta: f64) -> Self {
        Op::ZIncrBy { key: key.into(), member: member.into(), delta }
    }

    pub fn zrem_range_by_rank(key: impl Into<String>, start: isize, stop: isize) -> Self {
        Op::ZRemRangeByRank { key: key.into(), start, stop }
    }

    pub fn zinter_store(dest: impl Into<String>, sources: Vec<(String, f64)>) -> Self {
        Op::ZInterStore { dest: dest.into(), sources }
    }

    /// Every key this op writes.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Op::Del { keys } => keys.iter().map(String::as_str).collect(),
            Op::ZInterStore { dest, .. } => vec![dest.as_str()],
            Op::Set { key, .. }
            | Op::SetEx { key, .. }
            | Op::HSet { key, .. }
            | Op::HDel { key, .. }
            | Op::HIncrBy { key, .. }
            | Op::SAdd { key, .. }
            | Op::SRem { key, .. }
            | Op::ZAdd { key, .. }
            | Op::ZRem { key, .. }
            | Op::ZIncrBy { key, .. }
            | Op::ZRemRangeByRank { key, .. } => vec![key.as_str()],
        }
    }
}

/// Result of submitting a batch under WATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every op was applied as a unit.
    Applied,
    /// A watched key changed since the watch was established; nothing was applied.
    Conflict,
}

/// Reads performed while keys are watched, ending in EXEC or UNWATCH.
#[async_trait]
pub trait WatchSession: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StorageError>;
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StorageError>;
    async fn sismember(&mut self, key: &str, member: &str) -> Result<bool, StorageError>;
    async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, StorageError>;

    /// Submit `ops` as MULTI/EXEC, conditional on no watched key having changed.
    async fn exec(self: Box<Self>, ops: Vec<Op>) -> Result<ExecOutcome, StorageError>;

    async fn unwatch(self: Box<Self>) -> Result<(), StorageError>;
}

/// The shared key-value store every component coordinates through.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StorageError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StorageError>;
    async fn zcard(&self, key: &str) -> Result<u64, StorageError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError>;
    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, StorageError>;

    /// Members between rank `start` and `stop` inclusive, lowest score first.
    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StorageError>;

    /// Members only, same rank semantics as [`zrange_withscores`](Self::zrange_withscores).
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StorageError> {
        Ok(self
            .zrange_withscores(key, start, stop)
            .await?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    /// Mark `keys` for conflict detection and open a session for the
    /// read-verify-commit cycle.
    async fn watch(&self, keys: &[String]) -> Result<Box<dyn WatchSession>, StorageError>;

    /// Unconditional MULTI/EXEC batch.
    async fn exec_atomic(&self, ops: Vec<Op>) -> Result<(), StorageError>;

    /// Non-atomic pipeline, for throughput only.
    async fn pipeline(&self, ops: Vec<Op>) -> Result<(), StorageError>;
}
