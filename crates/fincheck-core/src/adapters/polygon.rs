use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use super::{elapsed_ms, parse_json, send, CallHealth};
use crate::data_source::{
    AuthRequirement, CapabilitySet, DataPayload, DataQuery, DataResponse, DataSource, QueryKind,
    ReliabilityTier, SourceError, SourceFuture, SourceMetadata,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{ProviderId, Ticker};

const BASE_URL: &str = "https://api.polygon.io";

/// Polygon.io adapter: previous-close aggregates and ticker reference data.
pub struct PolygonAdapter {
    metadata: SourceMetadata,
    http: Arc<dyn HttpClient>,
    auth: HttpAuth,
    health: CallHealth,
}

impl PolygonAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            metadata: SourceMetadata {
                provider: ProviderId::Polygon,
                capabilities: CapabilitySet::of(&[
                    QueryKind::Price,
                    QueryKind::MarketCap,
                    QueryKind::CompanyProfile,
                ]),
                tier: ReliabilityTier::Secondary,
                rate_limit: ProviderPolicy::polygon_default().rate_limit,
                auth: AuthRequirement::ApiKey,
            },
            http,
            auth: HttpAuth::BearerToken(api_key.into()),
            health: CallHealth::new(),
        }
    }

    async fn fetch(&self, query: &DataQuery) -> Result<DataPayload, SourceError> {
        match query.kind {
            QueryKind::Price => {
                let ticker = query.require_ticker()?;
                let url = format!(
                    "{BASE_URL}/v2/aggs/ticker/{}/prev?adjusted=true",
                    urlencoding::encode(ticker.as_str())
                );
                let envelope: AggregatesEnvelope = self.get(url).await?;
                let close = envelope
                    .results
                    .first()
                    .map(|bar| bar.close)
                    .ok_or_else(|| {
                        SourceError::not_found(format!("polygon has no previous close for {ticker}"))
                    })?;
                Ok(DataPayload::Quote {
                    price: close,
                    currency: String::from("USD"),
                })
            }
            QueryKind::MarketCap => {
                let ticker = query.require_ticker()?;
                let details = self.ticker_details(ticker).await?;
                let value = details.market_cap.ok_or_else(|| {
                    SourceError::not_found(format!("polygon has no market cap for {ticker}"))
                })?;
                Ok(DataPayload::MarketCap {
                    value,
                    currency: details.currency(),
                })
            }
            QueryKind::CompanyProfile => {
                let ticker = query.require_ticker()?;
                let details = self.ticker_details(ticker).await?;
                let currency = Some(details.currency());
                Ok(DataPayload::Profile {
                    ticker: ticker.clone(),
                    name: details.name,
                    exchange: details.primary_exchange,
                    currency,
                })
            }
            kind => Err(SourceError::unsupported(kind, ProviderId::Polygon)),
        }
    }

    async fn ticker_details(&self, ticker: &Ticker) -> Result<TickerDetails, SourceError> {
        let url = format!(
            "{BASE_URL}/v3/reference/tickers/{}",
            urlencoding::encode(ticker.as_str())
        );
        let envelope: TickerDetailsEnvelope = self.get(url).await?;
        envelope
            .results
            .ok_or_else(|| SourceError::not_found(format!("polygon has no reference data for {ticker}")))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, SourceError> {
        let request = HttpRequest::get(url).with_auth(&self.auth);
        let body = send(&self.http, request, ProviderId::Polygon, &self.health).await?;
        parse_json(&body, ProviderId::Polygon)
    }
}

impl DataSource for PolygonAdapter {
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

#[derive(Debug, Deserialize)]
struct AggregatesEnvelope {
    #[serde(default)]
    results: Vec<AggregateBar>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    #[serde(rename = "c")]
    close: f64,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsEnvelope {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    name: String,
    market_cap: Option<f64>,
    primary_exchange: Option<String>,
    currency_name: Option<String>,
}

impl TickerDetails {
    fn currency(&self) -> String {
        self.currency_name
            .as_deref()
            .unwrap_or("usd")
            .to_ascii_uppercase()
    }
}
