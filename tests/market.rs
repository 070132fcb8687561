// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Concurrent marketplace flows over the in-memory store.
//!
//! Run with: `cargo test --test market`

use std::sync::Arc;

use storefront_engine::{EngineConfig, InMemoryStore, Storefront, TxOutcome};

fn engine() -> Arc<Storefront> {
    Arc::new(Storefront::new(Arc::new(InMemoryStore::new()), EngineConfig::default()))
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listings_by_distinct_sellers_all_commit() {
    let engine = engine();
    for i in 0..20 {
        engine.market().grant_item(&format!("seller{}", i), &format!("item{}", i)).await.unwrap();
    }

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.list_item(&format!("item{}", i), &format!("seller{}", i), 100 + i).await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), TxOutcome::Committed);
    }
    for i in 0..20 {
        let price = engine.market().listed_price(&format!("item{}", i), &format!("seller{}", i)).await.unwrap();
        assert_eq!(price, Some(100 + i));
        assert!(engine.market().inventory(&format!("seller{}", i)).await.unwrap().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_item_listed_twice_concurrently_lists_once() {
    let engine = engine();
    engine.market().grant_item("seller", "itemX").await.unwrap();

    let tasks: Vec<_> = [100, 200]
        .into_iter()
        .map(|price| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.list_item("itemX", "seller", price).await })
        })
        .collect();

    let mut committed = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            TxOutcome::Committed => committed += 1,
            other => assert_eq!(other, TxOutcome::Rejected),
        }
    }
    assert_eq!(committed, 1);
    assert!(!engine.market().owns("seller", "itemX").await.unwrap());
}

// =============================================================================
// Purchasing
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_buyers_exactly_one_wins() {
    let engine = engine();
    engine.market().grant_item("seller", "itemX").await.unwrap();
    engine.list_item("itemX", "seller", 500).await.unwrap();
    for i in 0..8 {
        engine.market().deposit(&format!("buyer{}", i), 1_000).await.unwrap();
    }

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let buyer = format!("buyer{}", i);
                let outcome = engine.purchase_item(&buyer, "itemX", "seller", 500).await;
                (buyer, outcome)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for task in tasks {
        let (buyer, outcome) = task.await.unwrap();
        match outcome.unwrap() {
            TxOutcome::Committed => winners.push(buyer),
            other => assert_eq!(other, TxOutcome::Rejected),
        }
    }
    assert_eq!(winners.len(), 1);

    let winner = &winners[0];
    assert!(engine.market().owns(winner, "itemX").await.unwrap());
    assert_eq!(engine.market().funds(winner).await.unwrap(), Some(500));
    assert_eq!(engine.market().funds("seller").await.unwrap(), Some(500));

    // Money is conserved across all participants
    let mut total = engine.market().funds("seller").await.unwrap().unwrap_or(0);
    for i in 0..8 {
        total += engine.market().funds(&format!("buyer{}", i)).await.unwrap().unwrap_or(0);
    }
    assert_eq!(total, 8_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_purchases_all_commit() {
    let engine = engine();
    for i in 0..10 {
        let item = format!("item{}", i);
        engine.market().grant_item("seller", &item).await.unwrap();
        engine.list_item(&item, "seller", 10).await.unwrap();
        engine.market().deposit(&format!("buyer{}", i), 10).await.unwrap();
    }

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .purchase_item(&format!("buyer{}", i), &format!("item{}", i), "seller", 10)
                    .await
            })
        })
        .collect();

    for task in tasks {
        // Contention on market: is resolved by retrying, not rejection
        assert_eq!(task.await.unwrap().unwrap(), TxOutcome::Committed);
    }
    assert_eq!(engine.market().funds("seller").await.unwrap(), Some(100));
    for i in 0..10 {
        assert_eq!(engine.market().funds(&format!("buyer{}", i)).await.unwrap(), Some(0));
    }
}

#[tokio::test]
async fn price_mismatch_leaves_everything_untouched() {
    let engine = engine();
    engine.market().grant_item("seller", "itemX").await.unwrap();
    engine.list_item("itemX", "seller", 1_000).await.unwrap();
    engine.market().deposit("buyer", 5_000).await.unwrap();

    let outcome = engine.purchase_item("buyer", "itemX", "seller", 999).await.unwrap();

    assert_eq!(outcome, TxOutcome::Rejected);
    assert!(!outcome.is_retryable());
    assert_eq!(engine.market().funds("buyer").await.unwrap(), Some(5_000));
    assert_eq!(engine.market().funds("seller").await.unwrap(), None);
    assert_eq!(engine.market().listed_price("itemX", "seller").await.unwrap(), Some(1_000));
    assert!(engine.market().inventory("buyer").await.unwrap().is_empty());
}

#[tokio::test]
async fn item_is_never_both_owned_and_listed() {
    let engine = engine();
    engine.market().grant_item("alice", "lamp").await.unwrap();
    engine.market().deposit("bob", 50).await.unwrap();

    let check = |owner: &'static str| {
        let engine = engine.clone();
        async move {
            let owned = engine.market().owns(owner, "lamp").await.unwrap();
            let listed = engine.market().listed_price("lamp", "alice").await.unwrap().is_some();
            assert!(!(owned && listed));
            (owned, listed)
        }
    };

    assert_eq!(check("alice").await, (true, false));
    engine.list_item("lamp", "alice", 50).await.unwrap();
    assert_eq!(check("alice").await, (false, true));
    engine.purchase_item("bob", "lamp", "alice", 50).await.unwrap();
    assert_eq!(check("bob").await, (true, false));
}

#[tokio::test]
async fn dotted_ids_cannot_alias_another_listing() {
    let engine = engine();
    engine.market().grant_item("c", "a.b").await.unwrap();
    engine.market().deposit("buyer", 1_000).await.unwrap();

    // "a.b" by "c" and "a" by "b.c" would share one market member
    assert_eq!(engine.list_item("a.b", "c", 100).await.unwrap(), TxOutcome::Rejected);
    assert_eq!(
        engine.purchase_item("buyer", "a", "b.c", 100).await.unwrap(),
        TxOutcome::Rejected
    );

    assert_eq!(engine.market().inventory("c").await.unwrap(), vec!["a.b"]);
    assert!(engine.market().inventory("buyer").await.unwrap().is_empty());
    assert_eq!(engine.market().funds("buyer").await.unwrap(), Some(1_000));
    assert_eq!(engine.market().funds("b.c").await.unwrap(), None);
    assert_eq!(engine.market().funds("c").await.unwrap(), None);
}
