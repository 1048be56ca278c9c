use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{elapsed_ms, execute, into_body, parse_json, send, CallHealth};
use crate::data_source::{
    AuthRequirement, CapabilitySet, DataPayload, DataQuery, DataResponse, DataSource, QueryKind,
    ReliabilityTier, SourceError, SourceFuture, SourceMetadata, SymbolMatch,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{ProviderId, Ticker};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(3600);

/// Yahoo Finance adapter.
///
/// Yahoo's quote endpoint is unofficial and needs a session cookie plus a
/// matching crumb token: the cookie comes from `fc.yahoo.com` (kept by the
/// transport's cookie jar), the crumb from `getcrumb`. Crumbs are reused for
/// an hour and refreshed once when a quote call answers 401.
pub struct YahooAdapter {
    metadata: SourceMetadata,
    http: Arc<dyn HttpClient>,
    crumb: Mutex<Option<(String, Instant)>>,
    health: CallHealth,
}

impl YahooAdapter {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            metadata: SourceMetadata {
                provider: ProviderId::Yahoo,
                capabilities: CapabilitySet::of(&[
                    QueryKind::Price,
                    QueryKind::MarketCap,
                    QueryKind::CompanyProfile,
                    QueryKind::SymbolSearch,
                ]),
                tier: ReliabilityTier::Primary,
                rate_limit: ProviderPolicy::yahoo_default().rate_limit,
                auth: AuthRequirement::None,
            },
            http,
            crumb: Mutex::new(None),
            health: CallHealth::new(),
        }
    }

    async fn fetch(&self, query: &DataQuery) -> Result<DataPayload, SourceError> {
        match query.kind {
            QueryKind::Price => {
                let quote = self.quote(query.require_ticker()?).await?;
                let price = quote.regular_market_price.ok_or_else(|| {
                    SourceError::not_found(format!("yahoo has no price for {}", quote.symbol))
                })?;
                Ok(DataPayload::Quote {
                    price,
                    currency: quote.currency_or_usd(),
                })
            }
            QueryKind::MarketCap => {
                let quote = self.quote(query.require_ticker()?).await?;
                let value = quote.market_cap.ok_or_else(|| {
                    SourceError::not_found(format!("yahoo has no market cap for {}", quote.symbol))
                })?;
                Ok(DataPayload::MarketCap {
                    value,
                    currency: quote.currency_or_usd(),
                })
            }
            QueryKind::CompanyProfile => {
                let ticker = query.require_ticker()?;
                let quote = self.quote(ticker).await?;
                let currency = quote.currency.clone();
                let exchange = quote.full_exchange_name.clone().or(quote.exchange.clone());
                let name = quote.long_name.or(quote.short_name).ok_or_else(|| {
                    SourceError::not_found(format!("yahoo has no company name for {ticker}"))
                })?;
                Ok(DataPayload::Profile {
                    ticker: ticker.clone(),
                    name,
                    exchange,
                    currency,
                })
            }
            QueryKind::SymbolSearch => {
                let text = query.search_text.as_deref().ok_or_else(|| {
                    SourceError::invalid_request("symbol_search query requires search text")
                })?;
                self.search(text).await
            }
            kind => Err(SourceError::unsupported(kind, ProviderId::Yahoo)),
        }
    }

    async fn quote(&self, ticker: &Ticker) -> Result<YahooQuote, SourceError> {
        let body = self.quote_body(ticker).await?;
        let envelope: YahooQuoteEnvelope = parse_json(&body, ProviderId::Yahoo)?;

        if let Some(error) = envelope.quote_response.error {
            return Err(SourceError::unavailable(format!("yahoo API error: {error}")));
        }
        envelope
            .quote_response
            .result
            .into_iter()
            .find(|quote| quote.symbol.eq_ignore_ascii_case(ticker.as_str()))
            .ok_or_else(|| SourceError::not_found(format!("yahoo returned no quote for {ticker}")))
    }

    async fn quote_body(&self, ticker: &Ticker) -> Result<String, SourceError> {
        let crumb = self.crumb(false).await?;
        let response = execute(
            &self.http,
            quote_request(ticker, &crumb),
            ProviderId::Yahoo,
            &self.health,
        )
        .await?;

        if response.status != 401 {
            return into_body(response, ProviderId::Yahoo, &self.health);
        }

        debug!(%ticker, "yahoo rejected crumb; refreshing");
        let crumb = self.crumb(true).await?;
        send(
            &self.http,
            quote_request(ticker, &crumb),
            ProviderId::Yahoo,
            &self.health,
        )
        .await
    }

    async fn crumb(&self, force_refresh: bool) -> Result<String, SourceError> {
        let mut cached = self.crumb.lock().await;
        if !force_refresh {
            if let Some((crumb, fetched_at)) = cached.as_ref() {
                if fetched_at.elapsed() < CRUMB_TTL {
                    return Ok(crumb.clone());
                }
            }
        }

        // Seeds the session cookie; fc.yahoo.com answers 404 even on success.
        let _ = execute(
            &self.http,
            HttpRequest::get(COOKIE_URL).with_header("referer", REFERER),
            ProviderId::Yahoo,
            &self.health,
        )
        .await?;

        for endpoint in CRUMB_URLS {
            let request = HttpRequest::get(endpoint).with_header("referer", REFERER);
            let Ok(response) = execute(&self.http, request, ProviderId::Yahoo, &self.health).await
            else {
                continue;
            };
            if response.status == 429 {
                return Err(SourceError::rate_limited("yahoo throttled the crumb request"));
            }
            let crumb = response.body.trim();
            if response.is_success() && is_plausible_crumb(crumb) {
                *cached = Some((crumb.to_owned(), Instant::now()));
                return Ok(crumb.to_owned());
            }
        }

        *cached = None;
        Err(SourceError::unavailable(
            "failed to fetch yahoo crumb from all endpoints",
        ))
    }

    async fn search(&self, text: &str) -> Result<DataPayload, SourceError> {
        let url = format!(
            "{SEARCH_URL}?q={}&quotesCount=10&newsCount=0",
            urlencoding::encode(text)
        );
        let request = HttpRequest::get(url).with_header("referer", REFERER);
        let body = send(&self.http, request, ProviderId::Yahoo, &self.health).await?;
        let envelope: YahooSearchEnvelope = parse_json(&body, ProviderId::Yahoo)?;

        let matches = envelope
            .quotes
            .into_iter()
            .filter_map(|quote| {
                let ticker = Ticker::parse(&quote.symbol).ok()?;
                let name = quote.longname.or(quote.shortname)?;
                Some(SymbolMatch {
                    ticker,
                    name,
                    exchange: quote.exchange,
                    instrument_type: quote.quote_type,
                })
            })
            .collect();
        Ok(DataPayload::SearchResults { matches })
    }
}

impl DataSource for YahooAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn query<'a>(&'a self, query: &'a DataQuery) -> SourceFuture<'a, DataResponse> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.fetch(query).await;
            DataResponse::from_result(&self.metadata, query.kind, result, elapsed_ms(started))
        })
    }

    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(async move { self.health.is_healthy() })
    }
}

fn quote_request(ticker: &Ticker, crumb: &str) -> HttpRequest {
    HttpRequest::get(format!(
        "{QUOTE_URL}?symbols={}&crumb={}",
        urlencoding::encode(ticker.as_str()),
        urlencoding::encode(crumb)
    ))
    .with_header("referer", REFERER)
}

fn is_plausible_crumb(body: &str) -> bool {
    !body.is_empty()
        && body.len() < 100
        && !body.contains(char::is_whitespace)
        && !body.contains('<')
}

#[derive(Debug, Deserialize)]
struct YahooQuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResponse,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    market_cap: Option<f64>,
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    full_exchange_name: Option<String>,
    exchange: Option<String>,
}

impl YahooQuote {
    fn currency_or_usd(&self) -> String {
        self.currency
            .as_deref()
            .unwrap_or("USD")
            .to_ascii_uppercase()
    }
}

#[derive(Debug, Deserialize)]
struct YahooSearchEnvelope {
    #[serde(default)]
    quotes: Vec<YahooSearchQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooSearchQuote {
    symbol: String,
    shortname: Option<String>,
    longname: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{FixtureHttpClient, HttpResponse};

    const AAPL_QUOTE: &str = r#"{"quoteResponse":{"result":[{"symbol":"AAPL","regularMarketPrice":158.2,"marketCap":2480000000000,"currency":"USD","longName":"Apple Inc.","shortName":"Apple","fullExchangeName":"NasdaqGS"}],"error":null}}"#;

    fn adapter(http: FixtureHttpClient) -> (YahooAdapter, Arc<FixtureHttpClient>) {
        let http = Arc::new(http);
        (YahooAdapter::new(http.clone()), http)
    }

    fn aapl() -> Ticker {
        Ticker::parse("AAPL").expect("valid ticker")
    }

    #[tokio::test]
    async fn price_query_uses_crumb_and_normalizes_quote() {
        let (yahoo, http) = adapter(
            FixtureHttpClient::new()
                .with_json("getcrumb", "crumb-a")
                .with_json("v7/finance/quote", AAPL_QUOTE),
        );

        let response = yahoo.query(&DataQuery::price(aapl())).await;

        assert!(response.is_success(), "{:?}", response.error);
        assert_eq!(response.value(), Some(158.2));
        assert_eq!(response.confidence, ReliabilityTier::Primary.base_confidence());
        let quote_request = http
            .requests()
            .into_iter()
            .find(|request| request.url.contains("v7/finance/quote"))
            .expect("quote request");
        assert!(quote_request.url.contains("crumb=crumb-a"));
    }

    #[tokio::test]
    async fn crumb_is_reused_between_calls() {
        let (yahoo, http) = adapter(
            FixtureHttpClient::new()
                .with_json("getcrumb", "crumb-a")
                .with_json("v7/finance/quote", AAPL_QUOTE),
        );

        let _ = yahoo.query(&DataQuery::price(aapl())).await;
        let _ = yahoo.query(&DataQuery::market_cap(aapl())).await;

        assert_eq!(http.request_count("getcrumb"), 1);
        assert_eq!(http.request_count("v7/finance/quote"), 2);
    }

    #[tokio::test]
    async fn unauthorized_quote_refreshes_crumb_once() {
        let (yahoo, http) = adapter(
            FixtureHttpClient::new()
                .with_sequence(
                    "getcrumb",
                    vec![
                        Ok(HttpResponse::ok_json("crumb-a")),
                        Ok(HttpResponse::ok_json("crumb-b")),
                    ],
                )
                .with_sequence(
                    "v7/finance/quote",
                    vec![
                        Ok(HttpResponse::new(401, "")),
                        Ok(HttpResponse::ok_json(AAPL_QUOTE)),
                    ],
                ),
        );

        let response = yahoo.query(&DataQuery::market_cap(aapl())).await;

        assert_eq!(response.value(), Some(2.48e12));
        assert_eq!(http.request_count("getcrumb"), 2);
        assert_eq!(http.request_count("crumb=crumb-b"), 1);
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let (yahoo, _) = adapter(
            FixtureHttpClient::new()
                .with_json("getcrumb", "crumb-a")
                .with_json("v7/finance/quote", r#"{"quoteResponse":{"result":[],"error":null}}"#),
        );

        let response = yahoo
            .query(&DataQuery::price(Ticker::parse("ZZZZ").expect("valid")))
            .await;

        let error = response.error.expect("failure");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn search_skips_symbols_that_are_not_tickers() {
        let (yahoo, _) = adapter(FixtureHttpClient::new().with_json(
            "v1/finance/search",
            r#"{"quotes":[{"symbol":"^GSPC","shortname":"S&P 500"},{"symbol":"GOOGL","shortname":"Alphabet Inc.","longname":"Alphabet Inc.","exchange":"NMS","quoteType":"EQUITY"}]}"#,
        ));

        let response = yahoo
            .query(&DataQuery::symbol_search("alphabet").expect("valid"))
            .await;

        match response.payload {
            Some(DataPayload::SearchResults { matches }) => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].ticker.as_str(), "GOOGL");
                assert_eq!(matches[0].name, "Alphabet Inc.");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn indicator_queries_are_unsupported() {
        let (yahoo, http) = adapter(FixtureHttpClient::new());

        let response = yahoo.query(&DataQuery::inflation()).await;

        assert_eq!(
            response.error.map(|error| error.kind()),
            Some(SourceErrorKind::Unsupported)
        );
        assert!(http.requests().is_empty());
        assert!(!yahoo.supports(QueryKind::Inflation));
    }
}
