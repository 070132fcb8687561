// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Marketplace operations built on [`OptimisticTx`].
//!
//! An item is either in its owner's `inventory:{user}` set or listed in
//! `market:` as `{item}.{seller}`, never both. Prices and funds are integer
//! minor units; the market score stores the same integer as a float.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::config::EngineConfig;
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError, WatchSession};
use crate::transaction::{OptimisticTx, TxOutcome, TxPlan};

/// Largest integer exactly representable as a sorted-set score.
const MAX_EXACT_SCORE: i64 = 1 << 53;

fn price_from_score(member: &str, score: f64) -> Result<i64, StorageError> {
    if score.is_finite() && score.fract() == 0.0 && score.abs() <= MAX_EXACT_SCORE as f64 {
        Ok(score as i64)
    } else {
        Err(StorageError::Corruption {
            key: format!("{}{}", keys::MARKET, member),
            reason: format!("listing price {} is not a whole number of minor units", score),
        })
    }
}

fn parse_funds(key: &str, raw: &str) -> Result<i64, StorageError> {
    raw.parse::<i64>().map_err(|_| StorageError::Corruption {
        key: key.to_string(),
        reason: format!("funds '{}' is not an integer", raw),
    })
}

struct ListPlan {
    inventory: String,
    item: String,
    listing: String,
    price: i64,
}

#[async_trait]
impl TxPlan for ListPlan {
    async fn prepare(
        &mut self,
        session: &mut dyn WatchSession,
    ) -> Result<Option<Vec<Op>>, StorageError> {
        if !session.sismember(&self.inventory, &self.item).await? {
            return Ok(None);
        }
        Ok(Some(vec![
            Op::zadd(keys::MARKET, self.listing.clone(), self.price as f64),
            Op::srem(self.inventory.clone(), self.item.clone()),
        ]))
    }
}

struct PurchasePlan {
    buyer: String,
    seller: String,
    buyer_inventory: String,
    item: String,
    listing: String,
    expected_price: i64,
}

#[async_trait]
impl TxPlan for PurchasePlan {
    async fn prepare(
        &mut self,
        session: &mut dyn WatchSession,
    ) -> Result<Option<Vec<Op>>, StorageError> {
        let Some(score) = session.zscore(keys::MARKET, &self.listing).await? else {
            return Ok(None);
        };
        let price = price_from_score(&self.listing, score)?;

        let Some(raw) = session.hget(&self.buyer, keys::FUNDS_FIELD).await? else {
            return Ok(None);
        };
        let funds = parse_funds(&self.buyer, &raw)?;

        if price != self.expected_price || price > funds {
            return Ok(None);
        }

        let seller_funds = match session.hget(&self.seller, keys::FUNDS_FIELD).await? {
            Some(raw) => parse_funds(&self.seller, &raw)?,
            None => 0,
        };
        if seller_funds.checked_add(price).is_none() {
            warn!(seller = %self.seller, price, "Seller balance would overflow");
            return Ok(None);
        }

        Ok(Some(vec![
            Op::hincr_by(self.seller.clone(), keys::FUNDS_FIELD, price),
            Op::hincr_by(self.buyer.clone(), keys::FUNDS_FIELD, -price),
            Op::sadd(self.buyer_inventory.clone(), self.item.clone()),
            Op::zrem(keys::MARKET, vec![self.listing.clone()]),
        ]))
    }
}

/// Listing and purchasing with optimistic concurrency.
#[derive(Clone)]
pub struct Market {
    store: Arc<dyn KvStore>,
    tx: OptimisticTx,
    list_deadline: Duration,
    purchase_deadline: Duration,
}

impl Market {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        Self {
            tx: OptimisticTx::new(store.clone()),
            store,
            list_deadline: config.list_deadline(),
            purchase_deadline: config.purchase_deadline(),
        }
    }

    /// Move `item_id` from the seller's inventory into the market at `price`.
    ///
    /// Rejected when the seller does not own the item, the price is negative,
    /// or either id contains [`keys::LISTING_SEPARATOR`].
    #[instrument(skip(self))]
    pub async fn list_item(
        &self,
        item_id: &str,
        seller_id: &str,
        price: i64,
    ) -> Result<TxOutcome, StorageError> {
        if !(0..=MAX_EXACT_SCORE).contains(&price) {
            warn!(price, "Refusing to list at an unrepresentable price");
            return Ok(TxOutcome::Rejected);
        }
        let Some(listing) = keys::listing(item_id, seller_id) else {
            warn!("Refusing to list under an ambiguous item or seller id");
            return Ok(TxOutcome::Rejected);
        };
        let inventory = keys::inventory(seller_id);
        let watched = vec![inventory.clone()];
        let mut plan = ListPlan {
            inventory,
            item: item_id.to_string(),
            listing,
            price,
        };
        self.tx.attempt("list_item", &watched, self.list_deadline, &mut plan).await
    }

    /// Buy a listed item at `expected_price`.
    ///
    /// Rejected when the listing is gone, the price changed, the buyer
    /// cannot afford it, or crediting the seller would overflow. Funds are
    /// untouched on anything but `Committed`.
    #[instrument(skip(self))]
    pub async fn purchase_item(
        &self,
        buyer_id: &str,
        item_id: &str,
        seller_id: &str,
        expected_price: i64,
    ) -> Result<TxOutcome, StorageError> {
        // Such a member can never have been listed
        let Some(listing) = keys::listing(item_id, seller_id) else {
            return Ok(TxOutcome::Rejected);
        };
        let buyer = keys::user(buyer_id);
        let watched = vec![keys::MARKET.to_string(), buyer.clone()];
        let mut plan = PurchasePlan {
            buyer,
            seller: keys::user(seller_id),
            buyer_inventory: keys::inventory(buyer_id),
            item: item_id.to_string(),
            listing,
            expected_price,
        };
        self.tx
            .attempt("purchase_item", &watched, self.purchase_deadline, &mut plan)
            .await
    }

    /// Current asking price of a listing.
    pub async fn listed_price(&self, item_id: &str, seller_id: &str) -> Result<Option<i64>, StorageError> {
        let Some(listing) = keys::listing(item_id, seller_id) else {
            return Ok(None);
        };
        match self.store.zscore(keys::MARKET, &listing).await? {
            Some(score) => price_from_score(&listing, score).map(Some),
            None => Ok(None),
        }
    }

    pub async fn inventory(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        self.store.smembers(&keys::inventory(user_id)).await
    }

    pub async fn owns(&self, user_id: &str, item_id: &str) -> Result<bool, StorageError> {
        self.store.sismember(&keys::inventory(user_id), item_id).await
    }

    pub async fn funds(&self, user_id: &str) -> Result<Option<i64>, StorageError> {
        let key = keys::user(user_id);
        match self.store.hget(&key, keys::FUNDS_FIELD).await? {
            Some(raw) => parse_funds(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Credit a user's balance.
    pub async fn deposit(&self, user_id: &str, amount: i64) -> Result<(), StorageError> {
        self.store
            .exec_atomic(vec![Op::hincr_by(keys::user(user_id), keys::FUNDS_FIELD, amount)])
            .await
    }

    /// Place an item in a user's inventory.
    pub async fn grant_item(&self, user_id: &str, item_id: &str) -> Result<(), StorageError> {
        self.store
            .exec_atomic(vec![Op::sadd(keys::inventory(user_id), item_id)])
            .await
    }
}
