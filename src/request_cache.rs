// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Response caching for popular item pages.
//!
//! A request is cacheable when its query names an `item`, carries no
//! dynamic `_` marker, and the item ranks inside the popularity window.
//! Cached bodies live at `cache:{sha256(request)}` with a fixed TTL.
//!
//! The cache is an optimization only: store failures on the cache path are
//! logged and the response is computed live.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError};

#[derive(Debug, Error)]
pub enum CacheError<E> {
    #[error("response computation failed: {0}")]
    Compute(E),
}

/// Query parameters of an absolute URL.
///
/// A parameter without `=` maps to `None`. Returns `None` when `request`
/// is not of the form `scheme://host...`.
pub fn parse_query(request: &str) -> Option<HashMap<String, Option<String>>> {
    let (scheme, rest) = request.split_once("://")?;
    let valid_scheme = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return None;
    }

    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (authority, query) = match rest.split_once('?') {
        Some((before, query)) => (before, Some(query)),
        None => (rest, None),
    };
    let host = authority.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return None;
    }

    let mut params = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some((key, value)) => params.insert(key.to_string(), Some(value.to_string())),
                None => params.insert(pair.to_string(), None),
            };
        }
    }
    Some(params)
}

/// Stable cache key component for a request.
pub fn request_hash(request: &str) -> String {
    hex::encode(Sha256::digest(request.as_bytes()))
}

#[derive(Clone)]
pub struct RequestCache {
    store: Arc<dyn KvStore>,
    rank_window: u64,
    ttl_secs: u64,
}

impl RequestCache {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            rank_window: config.cache_rank_window,
            ttl_secs: config.cache_ttl_secs,
        }
    }

    pub async fn can_cache(&self, request: &str) -> Result<bool, StorageError> {
        let Some(params) = parse_query(request) else {
            return Ok(false);
        };
        let Some(Some(item)) = params.get("item") else {
            return Ok(false);
        };
        if params.contains_key("_") {
            return Ok(false);
        }
        let rank = self.store.zrank(keys::POPULARITY, item).await?;
        Ok(rank.is_some_and(|r| r < self.rank_window))
    }

    /// Serve `request` from cache when allowed, otherwise from `compute`.
    ///
    /// `compute` runs at most once. Its error is returned as
    /// [`CacheError::Compute`] and nothing is cached.
    pub async fn resolve<F, Fut, E>(&self, request: &str, compute: F) -> Result<String, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let cacheable = match self.can_cache(request).await {
            Ok(cacheable) => cacheable,
            Err(e) => {
                warn!(error = %e, "Rank lookup failed, serving uncached");
                false
            }
        };
        if !cacheable {
            crate::metrics::record_request_cache("bypass");
            return compute().await.map_err(CacheError::Compute);
        }

        let key = keys::cached_response(&request_hash(request));
        match self.store.get(&key).await {
            Ok(Some(body)) => {
                crate::metrics::record_request_cache("hit");
                return Ok(body);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, computing"),
        }

        let body = compute().await.map_err(CacheError::Compute)?;
        if let Err(e) = self
            .store
            .pipeline(vec![Op::set_ex(key.clone(), body.clone(), self.ttl_secs)])
            .await
        {
            warn!(key = %key, error = %e, "Cache write failed");
        }
        crate::metrics::record_request_cache("miss");
        debug!(key = %key, ttl = self.ttl_secs, "Response cached");
        Ok(body)
    }
}
