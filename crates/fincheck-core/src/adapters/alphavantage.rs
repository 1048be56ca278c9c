use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{elapsed_ms, parse_decimal, parse_json, send, CallHealth};
use crate::data_source::{
    AuthRequirement, CapabilitySet, DataPayload, DataQuery, DataResponse, DataSource, QueryKind,
    ReliabilityTier, SourceError, SourceFuture, SourceMetadata, SymbolMatch,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{ProviderId, Ticker};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage adapter.
///
/// Alpha Vantage answers throttled calls with HTTP 200 and a `Note` or
/// `Information` field instead of data; those are reported as rate limited.
pub struct AlphaVantageAdapter {
    metadata: SourceMetadata,
    http: Arc<dyn HttpClient>,
    api_key: String,
    health: CallHealth,
}

impl AlphaVantageAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            metadata: SourceMetadata {
                provider: ProviderId::AlphaVantage,
                capabilities: CapabilitySet::of(&[
                    QueryKind::Price,
                    QueryKind::MarketCap,
                    QueryKind::Revenue,
                    QueryKind::CompanyProfile,
                    QueryKind::SymbolSearch,
                ]),
                tier: ReliabilityTier::Secondary,
                rate_limit: ProviderPolicy::alphavantage_default().rate_limit,
                auth: AuthRequirement::ApiKey,
            },
            http,
            api_key: api_key.into(),
            health: CallHealth::new(),
        }
    }

    async fn fetch(&self, query: &DataQuery) -> Result<DataPayload, SourceError> {
        match query.kind {
            QueryKind::Price => {
                let ticker = query.require_ticker()?;
                let envelope: GlobalQuoteEnvelope = self
                    .call(&[("function", "GLOBAL_QUOTE"), ("symbol", ticker.as_str())])
                    .await?;
                let raw = envelope.quote.price.ok_or_else(|| {
                    SourceError::not_found(format!("alphavantage has no quote for {ticker}"))
                })?;
                Ok(DataPayload::Quote {
                    price: parse_decimal(&raw, "05. price", ProviderId::AlphaVantage)?,
                    currency: query.currency.clone().unwrap_or_else(|| String::from("USD")),
                })
            }
            QueryKind::MarketCap => {
                let overview = self.overview(query.require_ticker()?).await?;
                Ok(DataPayload::MarketCap {
                    value: overview.number(&overview.market_capitalization, "MarketCapitalization")?,
                    currency: overview.currency(),
                })
            }
            QueryKind::Revenue => {
                let overview = self.overview(query.require_ticker()?).await?;
                let period = match overview.latest_quarter.as_deref() {
                    Some(quarter) if quarter != "None" => format!("TTM ending {quarter}"),
                    _ => String::from("TTM"),
                };
                Ok(DataPayload::Revenue {
                    value: overview.number(&overview.revenue_ttm, "RevenueTTM")?,
                    currency: overview.currency(),
                    period,
                })
            }
            QueryKind::CompanyProfile => {
                let ticker = query.require_ticker()?;
                let overview = self.overview(ticker).await?;
                let currency = Some(overview.currency());
                let name = overview.name.ok_or_else(|| {
                    SourceError::not_found(format!("alphavantage has no company name for {ticker}"))
                })?;
                Ok(DataPayload::Profile {
                    ticker: ticker.clone(),
                    name,
                    exchange: overview.exchange,
                    currency,
                })
            }
            QueryKind::SymbolSearch => {
                let text = query.search_text.as_deref().ok_or_else(|| {
                    SourceError::invalid_request("symbol_search query requires search text")
                })?;
                let envelope: SearchEnvelope = self
                    .call(&[("function", "SYMBOL_SEARCH"), ("keywords", text)])
                    .await?;
                let matches = envelope
                    .best_matches
                    .into_iter()
                    .filter_map(|row| {
                        Some(SymbolMatch {
                            ticker: Ticker::parse(&row.symbol).ok()?,
                            name: row.name,
                            exchange: row.region,
                            instrument_type: row.kind,
                        })
                    })
                    .collect();
                Ok(DataPayload::SearchResults { matches })
            }
            kind => Err(SourceError::unsupported(kind, ProviderId::AlphaVantage)),
        }
    }

    async fn overview(&self, ticker: &Ticker) -> Result<Overview, SourceError> {
        let overview: Overview = self
            .call(&[("function", "OVERVIEW"), ("symbol", ticker.as_str())])
            .await?;
        if overview.symbol.is_none() {
            return Err(SourceError::not_found(format!(
                "alphavantage has no overview for {ticker}"
            )));
        }
        Ok(overview)
    }

    async fn call<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, SourceError> {
        let request = HttpRequest::get(self.url(params));
        let body = send(&self.http, request, ProviderId::AlphaVantage, &self.health).await?;
        let value: Value = parse_json(&body, ProviderId::AlphaVantage)?;
        check_service_messages(&value)?;
        serde_json::from_value(value).map_err(|error| {
            SourceError::parse(format!("failed to parse alphavantage response: {error}"))
        })
    }

    fn url(&self, params: &[(&str, &str)]) -> String {
        let mut url = String::from(BASE_URL);
        for (index, (name, value)) in params.iter().enumerate() {
            url.push(if index == 0 { '?' } else { '&' });
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url.push_str("&apikey=");
        url.push_str(&urlencoding::encode(&self.api_key));
        url
    }
}

impl DataSource for AlphaVantageAdapter {
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

fn check_service_messages(value: &Value) -> Result<(), SourceError> {
    for field in ["Note", "Information"] {
        if let Some(message) = value.get(field).and_then(Value::as_str) {
            return Err(SourceError::rate_limited(format!("alphavantage: {message}")));
        }
    }
    if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
        return Err(SourceError::not_found(format!("alphavantage: {message}")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote", default)]
    quote: GlobalQuote,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Overview {
    symbol: Option<String>,
    name: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    market_capitalization: Option<String>,
    #[serde(rename = "RevenueTTM")]
    revenue_ttm: Option<String>,
    latest_quarter: Option<String>,
}

impl Overview {
    fn number(&self, raw: &Option<String>, field: &str) -> Result<f64, SourceError> {
        match raw.as_deref() {
            None | Some("None") | Some("-") => Err(SourceError::not_found(format!(
                "alphavantage overview has no {field}"
            ))),
            Some(raw) => parse_decimal(raw, field, ProviderId::AlphaVantage),
        }
    }

    fn currency(&self) -> String {
        self.currency
            .as_deref()
            .unwrap_or("USD")
            .to_ascii_uppercase()
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<SearchRow>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "3. type")]
    kind: Option<String>,
    #[serde(rename = "4. region")]
    region: Option<String>,
}
