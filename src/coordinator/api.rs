// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request-path operations exposed by [`Storefront`].

use std::collections::HashMap;
use std::future::Future;

use crate::request_cache::CacheError;
use crate::rowcache;
use crate::storage::traits::StorageError;
use crate::transaction::TxOutcome;

use super::Storefront;

impl Storefront {
    // ═══════════════════════════════════════════════════════════════════════
    // Marketplace
    // ═══════════════════════════════════════════════════════════════════════

    /// See [`crate::market::Market::list_item`].
    pub async fn list_item(
        &self,
        item_id: &str,
        seller_id: &str,
        price: i64,
    ) -> Result<TxOutcome, StorageError> {
        self.market.list_item(item_id, seller_id, price).await
    }

    /// See [`crate::market::Market::purchase_item`].
    pub async fn purchase_item(
        &self,
        buyer_id: &str,
        item_id: &str,
        seller_id: &str,
        expected_price: i64,
    ) -> Result<TxOutcome, StorageError> {
        self.market
            .purchase_item(buyer_id, item_id, seller_id, expected_price)
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn check_token(&self, token: &str) -> Result<Option<String>, StorageError> {
        self.sessions.check_token(token).await
    }

    pub async fn update_token(
        &self,
        token: &str,
        user: &str,
        item: Option<&str>,
    ) -> Result<(), StorageError> {
        self.sessions.update_token(token, user, item).await
    }

    pub async fn add_to_cart(&self, session: &str, item: &str, count: i64) -> Result<(), StorageError> {
        self.sessions.add_to_cart(session, item, count).await
    }

    pub async fn cart(&self, session: &str) -> Result<HashMap<String, i64>, StorageError> {
        self.sessions.cart(session).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Caching
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn schedule_row_cache(&self, row_id: &str, interval_secs: u64) -> Result<(), StorageError> {
        rowcache::schedule_row_cache(self.store.as_ref(), row_id, interval_secs).await
    }

    pub async fn cancel_row_cache(&self, row_id: &str) -> Result<(), StorageError> {
        rowcache::cancel_row_cache(self.store.as_ref(), row_id).await
    }

    pub async fn cached_row(&self, row_id: &str) -> Result<Option<String>, StorageError> {
        rowcache::cached_row(self.store.as_ref(), row_id).await
    }

    pub async fn can_cache_request(&self, request: &str) -> Result<bool, StorageError> {
        self.request_cache.can_cache(request).await
    }

    /// See [`crate::request_cache::RequestCache::resolve`].
    pub async fn resolve_cached_request<F, Fut, E>(
        &self,
        request: &str,
        compute: F,
    ) -> Result<String, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        self.request_cache.resolve(request, compute).await
    }
}
