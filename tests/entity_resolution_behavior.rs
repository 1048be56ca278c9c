//! Behavior-driven tests for entity resolution
//!
//! These tests verify HOW company mentions become tickers: curated tables
//! first, then fuzzy matching, then provider lookups, with results cached.

use std::sync::Arc;

use fincheck_core::{
    FactChecker, FixtureHttpClient, ResolutionMethod, ResolveError, SourceRegistry,
};

const EMPTY_QUOTES: &str = r#"{"quoteResponse":{"result":[],"error":null}}"#;
const IBM_QUOTE: &str = r#"{"quoteResponse":{"result":[{"symbol":"IBM","regularMarketPrice":191.2,"currency":"USD","longName":"International Business Machines Corporation","fullExchangeName":"NYSE"}],"error":null}}"#;
const IBM_SEARCH: &str = r#"{"quotes":[{"symbol":"IBM","shortname":"International Business Machines","longname":"International Business Machines Corporation","exchange":"NYQ","quoteType":"EQUITY"}]}"#;
const BOEING_SEARCH: &str = r#"{"quotes":[{"symbol":"BA","shortname":"Boeing Company (The)","longname":"The Boeing Company","exchange":"NYQ","quoteType":"EQUITY"}]}"#;

fn checker_over(http: Arc<FixtureHttpClient>) -> FactChecker {
    FactChecker::builder()
        .with_registry(SourceRegistry::builder().with_http_client(http).build())
        .without_durable_store()
        .build()
}

fn offline_checker() -> FactChecker {
    checker_over(Arc::new(FixtureHttpClient::new()))
}

fn ibm_transport() -> Arc<FixtureHttpClient> {
    Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("v7/finance/quote", IBM_QUOTE)
            .with_json("v1/finance/search", IBM_SEARCH),
    )
}

fn yahoo_lookup_transport() -> Arc<FixtureHttpClient> {
    Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("v7/finance/quote", EMPTY_QUOTES)
            .with_json("v1/finance/search", BOEING_SEARCH),
    )
}

// =============================================================================
// Resolution: Curated Tables
// =============================================================================

#[tokio::test]
async fn alias_names_resolve_at_alias_confidence() {
    // Given: A resolver without network access
    let checker = offline_checker();

    // When: A known name variant is resolved
    let found = checker
        .resolve_entity("Alphabet Inc")
        .await
        .expect("valid input")
        .expect("resolved");

    // Then: The alias table answers with its fixed confidence
    assert_eq!(found.ticker.as_str(), "GOOGL");
    assert_eq!(found.confidence, 0.95);
    assert_eq!(found.method, ResolutionMethod::Alias);
    let json = serde_json::to_value(&found).expect("serializes");
    assert_eq!(json["method"], "alias_mapping");
}

#[tokio::test]
async fn canonical_names_and_cashtags_are_exact() {
    // Given: A resolver without network access
    let checker = offline_checker();

    // When: A canonical name and a cashtag are resolved
    let by_name = checker.resolve_entity("Apple").await.expect("valid").expect("resolved");
    let by_cashtag = checker.resolve_entity("$TSLA").await.expect("valid").expect("resolved");

    // Then: Both are exact matches
    assert_eq!(by_name.ticker.as_str(), "AAPL");
    assert_eq!(by_name.method, ResolutionMethod::Exact);
    assert_eq!(by_name.confidence, 1.0);
    assert_eq!(by_cashtag.ticker.as_str(), "TSLA");
    assert_eq!(by_cashtag.method, ResolutionMethod::Exact);
}

#[tokio::test]
async fn near_misses_resolve_fuzzily_below_alias_confidence() {
    // Given: A resolver without network access
    let checker = offline_checker();

    // When: A truncated company name is resolved
    let found = checker
        .resolve_entity("NVIDIA Corporatio")
        .await
        .expect("valid")
        .expect("resolved");

    // Then: The fuzzy match is accepted with a discounted confidence
    assert_eq!(found.ticker.as_str(), "NVDA");
    assert_eq!(found.method, ResolutionMethod::Fuzzy);
    assert!(found.confidence >= 0.7 && found.confidence < 0.95, "confidence {}", found.confidence);
}

// =============================================================================
// Resolution: Provider Lookup
// =============================================================================

#[tokio::test]
async fn unknown_names_fall_through_to_provider_search() {
    // Given: Yahoo knows no guessed ticker but its search finds the company
    let http = yahoo_lookup_transport();
    let checker = checker_over(http.clone());

    // When: A name missing from the curated tables is resolved
    let found = checker
        .resolve_entity("Boeing Company")
        .await
        .expect("valid")
        .expect("resolved");

    // Then: The search result is accepted as an external match
    assert_eq!(found.ticker.as_str(), "BA");
    assert_eq!(found.method, ResolutionMethod::External);
    assert_eq!(found.confidence, 0.85);
    assert_eq!(found.company_name.as_deref(), Some("The Boeing Company"));
    assert!(http.request_count("v7/finance/quote") >= 1, "candidate tickers were validated first");
    assert_eq!(http.request_count("v1/finance/search"), 1);
}

#[tokio::test]
async fn unlisted_bare_tickers_are_confirmed_by_a_provider() {
    // Given: A ticker missing from the curated tables that Yahoo quotes
    let http = ibm_transport();
    let checker = checker_over(http.clone());

    // When: The bare symbol is resolved
    let found = checker
        .resolve_entity("IBM")
        .await
        .expect("valid")
        .expect("resolved");

    // Then: The symbol is taken as an exact match once the profile confirms it
    assert_eq!(found.ticker.as_str(), "IBM");
    assert_eq!(found.method, ResolutionMethod::Exact);
    assert_eq!(found.confidence, 1.0);
    assert_eq!(
        found.company_name.as_deref(),
        Some("International Business Machines Corporation")
    );
    assert_eq!(http.request_count("v1/finance/search"), 0);
}

#[tokio::test]
async fn lowercase_tickers_match_on_the_symbol_itself() {
    // Given: A provider whose company name does not contain the input
    let checker = checker_over(ibm_transport());

    // When: The ticker is written in lowercase
    let found = checker
        .resolve_entity("ibm")
        .await
        .expect("valid")
        .expect("resolved");

    // Then: The guessed ticker is accepted because it spells the input
    assert_eq!(found.ticker.as_str(), "IBM");
    assert_eq!(found.method, ResolutionMethod::External);
    assert_eq!(found.confidence, 0.85);
}

#[tokio::test]
async fn unknown_bare_tickers_stay_unresolved_when_no_provider_confirms() {
    // Given: A provider that has no quote for the symbol
    let checker = checker_over(Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("v7/finance/quote", EMPTY_QUOTES)
            .with_json("v1/finance/search", r#"{"quotes":[]}"#),
    ));

    // When: A made-up bare symbol is resolved
    let found = checker.resolve_entity("QQQZ").await.expect("valid");

    // Then: Nothing is surfaced
    assert_eq!(found, None);
}

#[tokio::test]
async fn resolution_is_idempotent_within_the_ttl() {
    // Given: A resolver that already resolved a name through the provider
    let http = yahoo_lookup_transport();
    let checker = checker_over(http.clone());
    let first = checker.resolve_entity("Boeing Company").await.expect("valid");
    let requests_after_first = http.requests().len();

    // When: The same name (differently spaced) is resolved again
    let second = checker.resolve_entity("  boeing   company ").await.expect("valid");

    // Then: The cached match is returned without new provider traffic
    assert_eq!(first, second);
    assert_eq!(http.requests().len(), requests_after_first);
}

#[tokio::test]
async fn unresolvable_names_yield_none() {
    // Given: A provider that finds nothing
    let checker = checker_over(Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("v7/finance/quote", EMPTY_QUOTES)
            .with_json("v1/finance/search", r#"{"quotes":[]}"#),
    ));

    // When: A made-up company is resolved
    let found = checker.resolve_entity("Qwxz Zyxv Holdings").await.expect("valid");

    // Then: No match is surfaced
    assert_eq!(found, None);
}

#[tokio::test]
async fn blank_input_is_rejected() {
    let checker = offline_checker();

    let error = checker.resolve_entity("   ").await.expect_err("blank");

    assert_eq!(error, ResolveError::EmptyInput);
}

// =============================================================================
// Resolution: Batches
// =============================================================================

#[tokio::test]
async fn batch_resolution_preserves_input_order() {
    // Given: A mixed batch of resolvable, unresolvable and blank entries
    let checker = offline_checker();
    let entities = vec![
        String::from("Microsoft"),
        String::from(""),
        String::from("Facebook"),
        String::from("Qwxz Zyxv"),
        String::from("$NVDA"),
    ];

    // When: The batch is resolved
    let found = checker.resolve_entities(&entities).await;

    // Then: Results line up with the inputs
    let tickers = found
        .iter()
        .map(|entry| entry.as_ref().map(|found| found.ticker.as_str().to_owned()))
        .collect::<Vec<_>>();
    assert_eq!(
        tickers,
        vec![
            Some(String::from("MSFT")),
            None,
            Some(String::from("META")),
            None,
            Some(String::from("NVDA")),
        ]
    );
}
