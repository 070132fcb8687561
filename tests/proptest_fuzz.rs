// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for the storefront engine.
//!
//! Uses proptest to generate random inputs and verify ordering invariants
//! hold and parsers never panic.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use storefront_engine::keys;
use storefront_engine::request_cache::{parse_query, request_hash};
use storefront_engine::storage::zset::SortedSet;
use storefront_engine::{
    EngineConfig, InMemoryStore, KvStore, Op, PopularityRescaler, RequestCache, Sweep,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Distinct item ids with integer view counts, like ZINCRBY -1 produces
fn popularity_strategy() -> impl Strategy<Value = HashMap<String, i32>> {
    prop::collection::hash_map("[a-z]{1,6}[0-9]{0,3}", -10_000i32..0, 0..200)
}

/// Query strings that may or may not carry `item` and `_`
fn request_strategy() -> impl Strategy<Value = (String, bool, bool)> {
    (
        prop::option::of("[a-z0-9]{1,8}"),
        any::<bool>(),
        prop::collection::vec(("[a-z]{1,5}", "[a-z0-9]{0,5}"), 0..4),
    )
        .prop_map(|(item, dynamic, extra)| {
            let mut params: Vec<String> = extra.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            if let Some(item) = &item {
                params.push(format!("item={}", item));
            }
            if dynamic {
                params.push("_=1700000000".to_string());
            }
            let has_item = item.is_some() || extra.iter().any(|(k, v)| k == "item" && !v.is_empty());
            let has_marker = dynamic || extra.iter().any(|(k, _)| k == "_");
            (format!("http://shop.test/view?{}", params.join("&")), has_item, has_marker)
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Property tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_rescale_preserves_relative_order(
        views in popularity_strategy(),
        cap in 0usize..250,
    ) {
        let store = InMemoryStore::new();
        let (before, after) = runtime().block_on(async {
            let ops = views
                .iter()
                .map(|(item, score)| Op::zadd(keys::POPULARITY, item.clone(), *score as f64))
                .collect();
            store.exec_atomic(ops).await.unwrap();
            let before = store.zrange(keys::POPULARITY, 0, -1).await.unwrap();

            let config = EngineConfig { popularity_cap: cap, ..Default::default() };
            PopularityRescaler::new(Arc::new(store.clone()), &config)
                .run_once()
                .await
                .unwrap();

            let after = store.zrange_withscores(keys::POPULARITY, 0, -1).await.unwrap();
            (before, after)
        });

        let kept = before.len().min(cap);
        prop_assert_eq!(after.len(), kept);
        let members: Vec<String> = after.iter().map(|(m, _)| m.clone()).collect();
        prop_assert_eq!(&members[..], &before[..kept]);
        for (member, score) in &after {
            prop_assert_eq!(*score, views[member] as f64 * 0.5);
        }
    }

    #[test]
    fn prop_uncacheable_requests_are_never_cached(
        (request, has_item, has_marker) in request_strategy(),
    ) {
        let store = InMemoryStore::new();
        let (cacheable, stored) = runtime().block_on(async {
            // Every generated item id ranks inside the window
            let ops = (0..100)
                .map(|i| Op::zadd(keys::POPULARITY, format!("{}", i), -(i as f64)))
                .chain(std::iter::once(Op::zadd(keys::POPULARITY, "abc", -1.0)))
                .collect();
            store.exec_atomic(ops).await.unwrap();

            let cache = RequestCache::new(Arc::new(store.clone()), &EngineConfig::default());
            let cacheable = cache.can_cache(&request).await.unwrap();
            cache
                .resolve(&request, || async { Ok::<_, std::convert::Infallible>("body".to_string()) })
                .await
                .unwrap();
            (cacheable, store.exists(&keys::cached_response(&request_hash(&request))))
        });

        if !has_item || has_marker {
            prop_assert!(!cacheable);
            prop_assert!(!stored);
        }
        prop_assert_eq!(cacheable, stored);
    }

    #[test]
    fn fuzz_parse_query_never_panics(input in ".*") {
        let _ = parse_query(&input);
    }

    #[test]
    fn fuzz_parse_query_on_url_shapes(
        scheme in "[a-z]{0,5}",
        host in "[a-z.]{0,10}",
        query in "[a-z0-9=&_#?]{0,30}",
    ) {
        let request = format!("{}://{}/p?{}", scheme, host, query);
        if let Some(params) = parse_query(&request) {
            prop_assert!(!scheme.is_empty());
            prop_assert!(!host.is_empty());
            prop_assert!(params.len() <= query.len() + 1);
        }
    }

    #[test]
    fn prop_request_hash_deterministic(request in ".*") {
        let hash = request_hash(&request);
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        prop_assert_eq!(hash, request_hash(&request));
    }

    #[test]
    fn prop_sorted_set_rank_matches_range(
        ops in prop::collection::vec(("[a-e]{1,2}", -50i32..50, any::<bool>()), 0..100),
    ) {
        let mut set = SortedSet::new();
        for (member, score, remove) in &ops {
            if *remove {
                set.remove(member);
            } else {
                set.insert(member, *score as f64);
            }
        }

        let ranked = set.range(0, -1);
        prop_assert_eq!(ranked.len(), set.len());
        for window in ranked.windows(2) {
            let (a, sa) = &window[0];
            let (b, sb) = &window[1];
            prop_assert!(sa < sb || (sa == sb && a < b));
        }
        for (index, (member, score)) in ranked.iter().enumerate() {
            prop_assert_eq!(set.rank(member), Some(index));
            prop_assert_eq!(set.score(member), Some(*score));
        }
    }
}
