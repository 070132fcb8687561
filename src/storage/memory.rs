// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process [`KvStore`] with Redis semantics for the subset of commands
//! the engine uses.
//!
//! Every write bumps a per-key version; a [`WatchSession`] records the
//! versions of its watched keys and EXEC compares them under the same lock
//! that applies the batch, which gives the same conflict detection as
//! Redis WATCH/MULTI/EXEC.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{ExecOutcome, KvStore, Op, StorageError, WatchSession};
use super::zset::SortedSet;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    ZSet(SortedSet),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    clock: u64,
}

fn wrong_type(key: &str, expected: &'static str) -> StorageError {
    StorageError::WrongType { key: key.to_string(), expected }
}

impl State {
    fn purge_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
            self.bump(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&Value> {
        self.purge_expired(key);
        self.entries.get(key).map(|e| &e.value)
    }

    fn bump(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn string(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    fn hash(&mut self, key: &str) -> Result<Option<&HashMap<String, String>>, StorageError> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn set(&mut self, key: &str) -> Result<Option<&HashSet<String>>, StorageError> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn zset(&mut self, key: &str) -> Result<Option<&SortedSet>, StorageError> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::ZSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key, "zset")),
        }
    }

    fn expect_kind(&mut self, key: &str, expected: &'static str) -> Result<(), StorageError> {
        match self.live(key) {
            Some(v) if v.kind() != expected => Err(wrong_type(key, expected)),
            _ => Ok(()),
        }
    }

    /// Reject the batch up front so a bad op never leaves earlier ops applied.
    fn validate(&mut self, ops: &[Op]) -> Result<(), StorageError> {
        // Hash counters as they will stand after the ops seen so far;
        // `None` marks a non-integer value.
        let mut counters: HashMap<(String, String), Option<i64>> = HashMap::new();
        for op in ops {
            match op {
                Op::Set { key, .. } | Op::SetEx { key, .. } => {
                    counters.retain(|(k, _), _| k != key);
                }
                Op::Del { keys } => counters.retain(|(k, _), _| !keys.contains(k)),
                Op::HSet { key, field, value } => {
                    self.expect_kind(key, "hash")?;
                    counters.insert((key.clone(), field.clone()), value.parse::<i64>().ok());
                }
                Op::HDel { key, fields } => {
                    self.expect_kind(key, "hash")?;
                    for field in fields {
                        counters.insert((key.clone(), field.clone()), Some(0));
                    }
                }
                Op::HIncrBy { key, field, delta } => {
                    self.expect_kind(key, "hash")?;
                    let slot = (key.clone(), field.clone());
                    let current = match counters.get(&slot) {
                        Some(projected) => *projected,
                        None => match self.hash(key)?.and_then(|h| h.get(field)) {
                            Some(raw) => raw.parse::<i64>().ok(),
                            None => Some(0),
                        },
                    };
                    let Some(current) = current else {
                        return Err(StorageError::Corruption {
                            key: key.clone(),
                            reason: format!("field '{}' is not an integer", field),
                        });
                    };
                    let Some(next) = current.checked_add(*delta) else {
                        return Err(StorageError::Backend(format!(
                            "increment or decrement would overflow at {} {}",
                            key, field
                        )));
                    };
                    counters.insert(slot, Some(next));
                }
                Op::SAdd { key, .. } | Op::SRem { key, .. } => self.expect_kind(key, "set")?,
                Op::ZAdd { key, .. }
                | Op::ZRem { key, .. }
                | Op::ZIncrBy { key, .. }
                | Op::ZRemRangeByRank { key, .. } => self.expect_kind(key, "zset")?,
                Op::ZInterStore { sources, .. } => {
                    for (source, _) in sources {
                        self.expect_kind(source, "zset")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn entry_or(&mut self, key: &str, default: fn() -> Value) -> &mut Value {
        self.purge_expired(key);
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: default(), expires_at: None })
            .value
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Set { key, value } => {
                self.entries.insert(key.clone(), Entry { value: Value::Str(value.clone()), expires_at: None });
            }
            Op::SetEx { key, value, ttl_secs } => {
                let expires_at = Instant::now() + Duration::from_secs(*ttl_secs);
                self.entries.insert(key.clone(), Entry { value: Value::Str(value.clone()), expires_at: Some(expires_at) });
            }
            Op::Del { keys } => {
                for key in keys {
                    self.entries.remove(key);
                }
            }
            Op::HSet { key, field, value } => {
                if let Value::Hash(h) = self.entry_or(key, || Value::Hash(HashMap::new())) {
                    h.insert(field.clone(), value.clone());
                }
            }
            Op::HDel { key, fields } => {
                if let Some(Entry { value: Value::Hash(h), .. }) = self.entries.get_mut(key) {
                    for field in fields {
                        h.remove(field);
                    }
                }
            }
            Op::HIncrBy { key, field, delta } => {
                if let Value::Hash(h) = self.entry_or(key, || Value::Hash(HashMap::new())) {
                    let current = h.get(field).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
                    h.insert(field.clone(), current.saturating_add(*delta).to_string());
                }
            }
            Op::SAdd { key, member } => {
                if let Value::Set(s) = self.entry_or(key, || Value::Set(HashSet::new())) {
                    s.insert(member.clone());
                }
            }
            Op::SRem { key, member } => {
                if let Some(Entry { value: Value::Set(s), .. }) = self.entries.get_mut(key) {
                    s.remove(member);
                }
            }
            Op::ZAdd { key, member, score } => {
                if let Value::ZSet(z) = self.entry_or(key, || Value::ZSet(SortedSet::new())) {
                    z.insert(member, *score);
                }
            }
            Op::ZRem { key, members } => {
                if let Some(Entry { value: Value::ZSet(z), .. }) = self.entries.get_mut(key) {
                    for member in members {
                        z.remove(member);
                    }
                }
            }
            Op::ZIncrBy { key, member, delta } => {
                if let Value::ZSet(z) = self.entry_or(key, || Value::ZSet(SortedSet::new())) {
                    z.incr(member, *delta);
                }
            }
            Op::ZRemRangeByRank { key, start, stop } => {
                if let Some(Entry { value: Value::ZSet(z), .. }) = self.entries.get_mut(key) {
                    z.remove_range_by_rank(*start, *stop);
                }
            }
            Op::ZInterStore { dest, sources } => {
                let empty = SortedSet::new();
                let inputs: Vec<(&SortedSet, f64)> = sources
                    .iter()
                    .map(|(key, weight)| match self.entries.get(key) {
                        Some(Entry { value: Value::ZSet(z), .. }) => (z, *weight),
                        _ => (&empty, *weight),
                    })
                    .collect();
                let result = SortedSet::intersect_weighted(&inputs);
                self.entries.insert(dest.clone(), Entry { value: Value::ZSet(result), expires_at: None });
            }
        }

        for key in op.keys() {
            // Redis deletes containers that become empty
            if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
                self.entries.remove(key);
            }
            self.bump(key);
        }
    }

    fn apply_all(&mut self, ops: &[Op]) -> Result<(), StorageError> {
        self.validate(ops)?;
        for op in ops {
            self.apply(op);
        }
        Ok(())
    }
}

/// In-memory store emulating the Redis data model.
///
/// Cloning shares the underlying state, like cloning a connection handle.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| e.expires_at.map_or(true, |at| at > now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().live(key).is_some()
    }

    /// Remaining time to live, `None` for missing or persistent keys.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock();
        state.purge_expired(key);
        state
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Remove every key (FLUSHALL).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let keys: Vec<String> = state.entries.keys().cloned().collect();
        state.entries.clear();
        for key in keys {
            state.bump(&key);
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.state.lock().string(key)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        Ok(self.state.lock().hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.state.lock().hash(key)?.cloned().unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self.state.lock().set(key)?.is_some_and(|s| s.contains(member)))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let mut members: Vec<String> = self
            .state
            .lock()
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StorageError> {
        Ok(self.state.lock().zset(key)?.map_or(0, |z| z.len() as u64))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        Ok(self.state.lock().zset(key)?.and_then(|z| z.score(member)))
    }

    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, StorageError> {
        Ok(self
            .state
            .lock()
            .zset(key)?
            .and_then(|z| z.rank(member))
            .map(|r| r as u64))
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StorageError> {
        Ok(self
            .state
            .lock()
            .zset(key)?
            .map(|z| z.range(start, stop))
            .unwrap_or_default())
    }

    async fn watch(&self, keys: &[String]) -> Result<Box<dyn WatchSession>, StorageError> {
        let mut state = self.state.lock();
        let watched = keys
            .iter()
            .map(|k| {
                state.purge_expired(k);
                (k.clone(), state.version(k))
            })
            .collect();
        Ok(Box::new(MemoryWatch { store: self.clone(), watched }))
    }

    async fn exec_atomic(&self, ops: Vec<Op>) -> Result<(), StorageError> {
        self.state.lock().apply_all(&ops)
    }

    async fn pipeline(&self, ops: Vec<Op>) -> Result<(), StorageError> {
        // Each op is atomic on its own; the batch is not.
        for op in &ops {
            self.state.lock().apply_all(std::slice::from_ref(op))?;
        }
        Ok(())
    }
}

struct MemoryWatch {
    store: InMemoryStore,
    watched: Vec<(String, u64)>,
}

#[async_trait]
impl WatchSession for MemoryWatch {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        self.store.get(key).await
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        self.store.hget(key, field).await
    }

    async fn sismember(&mut self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.store.sismember(key, member).await
    }

    async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        self.store.zscore(key, member).await
    }

    async fn exec(self: Box<Self>, ops: Vec<Op>) -> Result<ExecOutcome, StorageError> {
        let mut state = self.store.state.lock();
        for (key, seen) in &self.watched {
            state.purge_expired(key);
            if state.version(key) != *seen {
                return Ok(ExecOutcome::Conflict);
            }
        }
        state.apply_all(&ops)?;
        Ok(ExecOutcome::Applied)
    }

    async fn unwatch(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}
