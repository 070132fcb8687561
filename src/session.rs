// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Login tokens, recent views and carts.
//!
//! These writes are pipelined, not transactional: each command is
//! independently idempotent enough that a partial batch only loses
//! freshness, never consistency.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::clock::unix_now;
use crate::config::EngineConfig;
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError};

#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn KvStore>,
    recent_view_limit: usize,
}

impl Sessions {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            recent_view_limit: config.recent_view_limit,
        }
    }

    /// User logged in under `token`, if any.
    pub async fn check_token(&self, token: &str) -> Result<Option<String>, StorageError> {
        self.store.hget(keys::LOGIN, token).await
    }

    /// Record activity for `token`, optionally a view of `item`.
    ///
    /// All writes go out in one pipelined round trip.
    #[instrument(skip(self))]
    pub async fn update_token(
        &self,
        token: &str,
        user: &str,
        item: Option<&str>,
    ) -> Result<(), StorageError> {
        self.store.pipeline(self.token_ops(token, user, item)).await
    }

    /// Same writes as [`update_token`](Self::update_token), one round trip
    /// per command.
    #[instrument(skip(self))]
    pub async fn update_token_sequential(
        &self,
        token: &str,
        user: &str,
        item: Option<&str>,
    ) -> Result<(), StorageError> {
        for op in self.token_ops(token, user, item) {
            self.store.exec_atomic(vec![op]).await?;
        }
        Ok(())
    }

    fn token_ops(&self, token: &str, user: &str, item: Option<&str>) -> Vec<Op> {
        let now = unix_now();
        let mut ops = vec![
            Op::hset(keys::LOGIN, token, user),
            Op::zadd(keys::RECENT, token, now),
        ];
        if let Some(item) = item {
            let views = keys::recent_views(token);
            let keep = isize::try_from(self.recent_view_limit).unwrap_or(isize::MAX);
            ops.push(Op::zadd(views.clone(), item, now));
            ops.push(Op::zrem_range_by_rank(views, 0, -keep - 1));
            // Views decrement so the most viewed item ranks first
            ops.push(Op::zincr_by(keys::POPULARITY, item, -1.0));
        }
        ops
    }

    /// Set the quantity of `item` in a cart; zero or less removes it.
    pub async fn add_to_cart(&self, session: &str, item: &str, count: i64) -> Result<(), StorageError> {
        let cart = keys::cart(session);
        let op = if count <= 0 {
            Op::hdel(cart, vec![item.to_string()])
        } else {
            Op::hset(cart, item, count.to_string())
        };
        self.store.pipeline(vec![op]).await
    }

    pub async fn cart(&self, session: &str) -> Result<HashMap<String, i64>, StorageError> {
        let key = keys::cart(session);
        self.store
            .hgetall(&key)
            .await?
            .into_iter()
            .map(|(item, raw)| match raw.parse::<i64>() {
                Ok(count) => Ok((item, count)),
                Err(_) => Err(StorageError::Corruption {
                    key: key.clone(),
                    reason: format!("count '{}' for {} is not an integer", raw, item),
                }),
            })
            .collect()
    }

    /// Items recently viewed under `token`, newest first.
    pub async fn recent_views(&self, token: &str) -> Result<Vec<String>, StorageError> {
        let mut items = self.store.zrange(&keys::recent_views(token), 0, -1).await?;
        items.reverse();
        Ok(items)
    }
}
