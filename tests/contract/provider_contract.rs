//! Contract every provider adapter must honour, checked against scripted
//! provider replies.

use std::sync::Arc;

use fincheck_core::data_source::AuthRequirement;
use fincheck_core::{
    AlphaVantageAdapter, DataPayload, DataQuery, DataSource, FixtureHttpClient, FredAdapter,
    HttpClient, PolygonAdapter, ProviderId, QueryKind, SourceErrorKind, Ticker, YahooAdapter,
};

const YAHOO_QUOTE: &str = r#"{"quoteResponse":{"result":[{"symbol":"AAPL","regularMarketPrice":158.2,"marketCap":2480000000000,"currency":"USD","longName":"Apple Inc.","fullExchangeName":"NasdaqGS"}],"error":null}}"#;
const YAHOO_SEARCH: &str = r#"{"quotes":[{"symbol":"AAPL","shortname":"Apple Inc.","longname":"Apple Inc.","exchange":"NMS","quoteType":"EQUITY"}]}"#;
const AV_QUOTE: &str = r#"{"Global Quote":{"01. symbol":"AAPL","05. price":"158.2000"}}"#;
const AV_OVERVIEW: &str = r#"{"Symbol":"AAPL","Name":"Apple Inc","Exchange":"NASDAQ","Currency":"USD","MarketCapitalization":"2480000000000","RevenueTTM":"385603000000","LatestQuarter":"2024-06-30"}"#;
const AV_SEARCH: &str = r#"{"bestMatches":[{"1. symbol":"AAPL","2. name":"Apple Inc","3. type":"Equity","4. region":"United States"}]}"#;
const POLYGON_PREV: &str = r#"{"status":"OK","resultsCount":1,"results":[{"T":"AAPL","c":158.2}]}"#;
const POLYGON_REFERENCE: &str = r#"{"status":"OK","results":{"ticker":"AAPL","name":"Apple Inc.","market_cap":2.48e12,"primary_exchange":"XNAS","currency_name":"usd"}}"#;
const FRED_FEDFUNDS: &str = r#"{"observations":[{"date":"2024-06-01","value":"5.33"}]}"#;
const FRED_CPI: &str = r#"{"observations":[{"date":"2024-06-01","value":"314.175"},{"date":"2023-06-01","value":"304.003"}]}"#;

fn healthy_transport() -> Arc<dyn HttpClient> {
    Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("v7/finance/quote", YAHOO_QUOTE)
            .with_json("v1/finance/search", YAHOO_SEARCH)
            .with_json("function=GLOBAL_QUOTE", AV_QUOTE)
            .with_json("function=OVERVIEW", AV_OVERVIEW)
            .with_json("function=SYMBOL_SEARCH", AV_SEARCH)
            .with_json("/v2/aggs/ticker/AAPL/prev", POLYGON_PREV)
            .with_json("/v3/reference/tickers/AAPL", POLYGON_REFERENCE)
            .with_json("series_id=FEDFUNDS", FRED_FEDFUNDS)
            .with_json("series_id=CPIAUCSL", FRED_CPI),
    )
}

fn adapters(http: Arc<dyn HttpClient>) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(YahooAdapter::new(Arc::clone(&http))),
        Arc::new(AlphaVantageAdapter::new(Arc::clone(&http), "av-key")),
        Arc::new(PolygonAdapter::new(Arc::clone(&http), "poly-key")),
        Arc::new(FredAdapter::new(http, "fred-key")),
    ]
}

fn query_for(kind: QueryKind) -> DataQuery {
    let aapl = Ticker::parse("AAPL").expect("valid ticker");
    match kind {
        QueryKind::Price => DataQuery::price(aapl),
        QueryKind::MarketCap => DataQuery::market_cap(aapl),
        QueryKind::Revenue => DataQuery::revenue(aapl),
        QueryKind::CompanyProfile => DataQuery::company_profile(aapl),
        QueryKind::InterestRate => DataQuery::interest_rate(),
        QueryKind::Inflation => DataQuery::inflation(),
        QueryKind::SymbolSearch => DataQuery::symbol_search("apple").expect("valid search"),
    }
}

#[test]
fn metadata_describes_each_provider() {
    let sources = adapters(healthy_transport());

    let ids = sources.iter().map(|source| source.id()).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![ProviderId::Yahoo, ProviderId::AlphaVantage, ProviderId::Polygon, ProviderId::Fred]
    );
    for source in &sources {
        let metadata = source.metadata();
        assert!(
            !metadata.capabilities.kinds().is_empty(),
            "provider '{}' declares no capabilities",
            metadata.provider
        );
        let expected_auth = if metadata.provider.api_key_env_vars().is_some() {
            AuthRequirement::ApiKey
        } else {
            AuthRequirement::None
        };
        assert_eq!(metadata.auth, expected_auth, "provider '{}': auth", metadata.provider);
        assert!(metadata.rate_limit.requests_per_minute > 0);
    }
}

#[tokio::test]
async fn supported_kinds_answer_with_normalized_payloads() {
    for source in adapters(healthy_transport()) {
        let provider = source.id();
        for kind in source.metadata().capabilities.kinds() {
            let response = source.query(&query_for(kind)).await;

            assert!(
                response.is_success(),
                "provider '{provider}' {kind}: {:?}",
                response.error
            );
            assert_eq!(response.provider, provider);
            assert_eq!(response.kind, kind);
            assert_eq!(response.confidence, source.metadata().tier.base_confidence());
            assert!(!response.from_cache);
            assert!(!response.is_fallback);

            let payload = response.payload.expect("payload");
            match kind {
                QueryKind::CompanyProfile => {
                    assert!(matches!(payload, DataPayload::Profile { ref ticker, .. } if ticker.as_str() == "AAPL"));
                }
                QueryKind::SymbolSearch => match payload {
                    DataPayload::SearchResults { matches } => {
                        assert_eq!(matches[0].ticker.as_str(), "AAPL", "provider '{provider}'");
                    }
                    other => panic!("provider '{provider}': unexpected payload {other:?}"),
                },
                _ => {
                    let value = payload.numeric_value().expect("numeric payload");
                    assert!(value.is_finite() && value > 0.0, "provider '{provider}' {kind}: {value}");
                }
            }
        }
    }
}

#[tokio::test]
async fn unsupported_kinds_fail_without_network_traffic() {
    let http = Arc::new(FixtureHttpClient::new());
    for source in adapters(http.clone()) {
        for kind in QueryKind::ALL {
            if source.supports(kind) {
                continue;
            }
            let response = source.query(&query_for(kind)).await;

            assert!(response.payload.is_none());
            assert_eq!(
                response.error.map(|error| error.kind()),
                Some(SourceErrorKind::Unsupported),
                "provider '{}' {kind}",
                source.id()
            );
        }
    }

    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn throttled_providers_report_rate_limiting() {
    let http: Arc<dyn HttpClient> = Arc::new(FixtureHttpClient::new().with_status("", 429, ""));

    for source in adapters(http) {
        let kind = source.metadata().capabilities.kinds()[0];
        let response = source.query(&query_for(kind)).await;

        let error = response.error.expect("throttled call fails");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited, "provider '{}'", source.id());
        assert!(error.retryable());
    }
}

#[tokio::test]
async fn transport_failures_are_classified_and_mark_the_adapter_unhealthy() {
    let http: Arc<dyn HttpClient> =
        Arc::new(FixtureHttpClient::new().with_transport_error("", "connection reset by peer"));

    for source in adapters(http) {
        let kind = source.metadata().capabilities.kinds()[0];
        let response = source.query(&query_for(kind)).await;

        let error = response.error.expect("transport failure surfaces as an error");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable, "provider '{}'", source.id());
        assert!(!source.health_check().await, "provider '{}' still healthy", source.id());
    }
}

#[tokio::test]
async fn malformed_bodies_are_parse_errors() {
    let http: Arc<dyn HttpClient> = Arc::new(
        FixtureHttpClient::new()
            .with_json("getcrumb", "crumb-a")
            .with_json("", "<html>not json</html>"),
    );

    for source in adapters(http) {
        let kind = source.metadata().capabilities.kinds()[0];
        let response = source.query(&query_for(kind)).await;

        assert_eq!(
            response.error.map(|error| error.kind()),
            Some(SourceErrorKind::Parse),
            "provider '{}'",
            source.id()
        );
    }
}
