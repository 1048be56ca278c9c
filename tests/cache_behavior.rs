//! Behavior-driven tests for the response cache
//!
//! These tests verify HOW cached entries live and die: TTL expiry, promotion
//! from the durable tier, purging, and persistence across service instances.

use std::sync::Arc;
use std::time::Duration;

use fincheck_core::cache::{response_key, ticker_match_key};
use fincheck_core::{
    ClaimKind, ClaimValue, DurableStore, FactCheckConfig, FactChecker, FinancialClaim,
    FixtureHttpClient, MemoryStore, ProviderId, QueryKind, Scale, SourceRegistry, TieredCache,
};
use fincheck_store::{BlobStore, StoreConfig, StoredBlob};
use serde_json::json;
use time::OffsetDateTime;

const YAHOO_QUOTE: &str = r#"{"quoteResponse":{"result":[{"symbol":"AAPL","regularMarketPrice":158.2,"currency":"USD"}],"error":null}}"#;

fn aapl_price_claim() -> FinancialClaim {
    FinancialClaim::new("AAPL is trading at $158", ClaimKind::Price)
        .expect("claim")
        .with_entity("AAPL")
        .with_value(ClaimValue::currency(158.0, Scale::Units, "USD").expect("value"))
}

// =============================================================================
// Cache: Expiry
// =============================================================================

#[tokio::test]
async fn entries_disappear_once_their_ttl_elapses() {
    // Given: An entry stored with a short TTL
    let cache = TieredCache::memory_only();
    cache.put("quote", json!({"price": 158.2}), Duration::from_millis(50)).await;
    assert_eq!(cache.get("quote").await, Some(json!({"price": 158.2})));

    // When: The TTL elapses
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Then: The entry reads as absent
    assert_eq!(cache.get("quote").await, None);
}

#[tokio::test]
async fn expired_entries_do_not_linger_in_memory() {
    // Given: A cache holding one expired and one live entry
    let cache = TieredCache::memory_only();
    cache.put("old-quote", json!(150.0), Duration::from_millis(20)).await;
    cache.put("new-quote", json!(158.2), Duration::from_secs(60)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.len().await, 2);

    // When: The expired key is looked up again
    let value = cache.get("old-quote").await;

    // Then: It reads as absent and no longer occupies memory
    assert_eq!(value, None);
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.get("new-quote").await, Some(json!(158.2)));
}

#[tokio::test]
async fn zero_ttl_stores_nothing() {
    // Given: An empty cache
    let cache = TieredCache::memory_only();

    // When: A value is stored with a zero TTL
    cache.put("quote", json!(1), Duration::ZERO).await;

    // Then: Nothing is stored
    assert!(cache.is_empty().await);
    assert_eq!(cache.get("quote").await, None);
}

#[tokio::test]
async fn clear_expired_removes_only_dead_entries() {
    // Given: One short-lived and one long-lived entry
    let durable = Arc::new(MemoryStore::new());
    let cache = TieredCache::with_durable(durable.clone());
    cache.put("short", json!("a"), Duration::from_millis(20)).await;
    cache.put("long", json!("b"), Duration::from_secs(60)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // When: Expired entries are cleared
    let removed = cache.clear_expired().await;

    // Then: Only the short-lived entry is gone, from both tiers
    assert_eq!(removed, 1);
    assert_eq!(cache.len().await, 1);
    assert_eq!(durable.len(), 1);
    assert_eq!(cache.get("long").await, Some(json!("b")));
}

// =============================================================================
// Cache: Durable Tier
// =============================================================================

#[tokio::test]
async fn durable_hits_are_promoted_into_memory() {
    // Given: A value present only in the durable tier
    let durable = Arc::new(MemoryStore::new());
    durable
        .save("quote", &StoredBlob::now(json!(158.2), Duration::from_secs(60)))
        .expect("save");
    let cache = TieredCache::with_durable(durable);
    assert!(cache.is_empty().await);

    // When: The key is read
    let value = cache.get("quote").await;

    // Then: The value is returned and now lives in memory too
    assert_eq!(value, Some(json!(158.2)));
    let stats = cache.stats().await;
    assert_eq!(stats.live_entries, 1);
    assert!(stats.durable);
}

#[tokio::test]
async fn expired_durable_entries_are_misses() {
    // Given: A durable entry stored two minutes ago with a one minute TTL
    let durable = Arc::new(MemoryStore::new());
    let stored_at = OffsetDateTime::now_utc() - Duration::from_secs(120);
    durable
        .save("quote", &StoredBlob::new(json!(158.2), stored_at, Duration::from_secs(60)))
        .expect("save");
    let cache = TieredCache::with_durable(durable);

    // When: The key is read
    let value = cache.get("quote").await;

    // Then: It is absent and not promoted
    assert_eq!(value, None);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn duckdb_tier_survives_a_new_cache_instance() {
    // Given: A value written through a cache backed by an on-disk store
    let home = tempfile::tempdir().expect("temp dir");
    {
        let store = BlobStore::open(StoreConfig::in_home(home.path())).expect("open store");
        let cache = TieredCache::with_durable(Arc::new(store));
        cache.put("quote", json!({"price": 158.2}), Duration::from_secs(60)).await;
    }

    // When: A fresh cache opens the same store
    let store = BlobStore::open(StoreConfig::in_home(home.path())).expect("reopen store");
    let cache = TieredCache::with_durable(Arc::new(store));

    // Then: The value is served from disk
    assert_eq!(cache.get("quote").await, Some(json!({"price": 158.2})));
}

#[tokio::test]
async fn verification_results_are_reused_across_service_restarts() {
    // Given: A fact checker that verified a claim with an on-disk cache
    let home = tempfile::tempdir().expect("temp dir");
    let config = FactCheckConfig::default().with_fincheck_home(home.path());
    let transport = || {
        Arc::new(
            FixtureHttpClient::new()
                .with_json("getcrumb", "crumb-a")
                .with_json("v7/finance/quote", YAHOO_QUOTE),
        )
    };
    let first = FactChecker::builder()
        .with_config(config.clone())
        .with_registry(SourceRegistry::builder().with_http_client(transport()).build())
        .build();
    assert!(first.cache().has_durable_tier());
    let warm = first.verify(&[aapl_price_claim()]).await;
    assert_eq!(warm.meta.provider_calls, 1);
    first.shutdown().await;

    // When: A new fact checker over the same home verifies the claim again
    let http = transport();
    let second = FactChecker::builder()
        .with_config(config)
        .with_registry(SourceRegistry::builder().with_http_client(http.clone()).build())
        .build();
    let report = second.verify(&[aapl_price_claim()]).await;

    // Then: The answer comes from the durable cache
    assert_eq!(report.meta.cache_hits, 1);
    assert_eq!(report.meta.provider_calls, 0);
    assert!(http.requests().is_empty());
    assert!(report.results[0].verified);
}

// =============================================================================
// Cache: Keys
// =============================================================================

#[test]
fn keys_are_stable_hex_digests() {
    let key = response_key(ProviderId::Yahoo, QueryKind::Price, "AAPL");

    assert_eq!(key, response_key(ProviderId::Yahoo, QueryKind::Price, "AAPL"));
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|ch| ch.is_ascii_hexdigit()));
    assert_ne!(key, response_key(ProviderId::Polygon, QueryKind::Price, "AAPL"));
    assert_ne!(key, response_key(ProviderId::Yahoo, QueryKind::MarketCap, "AAPL"));
    assert_ne!(ticker_match_key("apple"), ticker_match_key("apple inc"));
}
