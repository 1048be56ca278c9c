//! Data source trait and the provider-neutral query/response types.
//!
//! Every adapter answers a [`DataQuery`] with a [`DataResponse`]. Adapters never
//! return `Err`: failures are carried in [`DataResponse::error`] so the executor
//! can treat every outcome uniformly when falling back.
//!
//! # Query kinds
//!
//! | Kind | Subject | Payload |
//! |------|---------|---------|
//! | `price` | ticker | [`DataPayload::Quote`] |
//! | `market_cap` | ticker | [`DataPayload::MarketCap`] |
//! | `revenue` | ticker | [`DataPayload::Revenue`] |
//! | `interest_rate` | country | [`DataPayload::Indicator`] |
//! | `inflation` | country | [`DataPayload::Indicator`] |
//! | `company_profile` | ticker | [`DataPayload::Profile`] |
//! | `symbol_search` | free text | [`DataPayload::SearchResults`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider_policy::RateLimit;
use crate::{ProviderId, Ticker, UtcDateTime, ValidationError};

/// Kind of data requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Price,
    MarketCap,
    Revenue,
    InterestRate,
    Inflation,
    CompanyProfile,
    SymbolSearch,
}

impl QueryKind {
    pub const ALL: [Self; 7] = [
        Self::Price,
        Self::MarketCap,
        Self::Revenue,
        Self::InterestRate,
        Self::Inflation,
        Self::CompanyProfile,
        Self::SymbolSearch,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::MarketCap => "market_cap",
            Self::Revenue => "revenue",
            Self::InterestRate => "interest_rate",
            Self::Inflation => "inflation",
            Self::CompanyProfile => "company_profile",
            Self::SymbolSearch => "symbol_search",
        }
    }

    /// Whether the query is keyed by a ticker.
    pub const fn needs_ticker(self) -> bool {
        matches!(
            self,
            Self::Price | Self::MarketCap | Self::Revenue | Self::CompanyProfile
        )
    }

    /// Live market data expires quickly; profiles, search results and
    /// indicator series change slowly.
    pub const fn is_live_market_data(self) -> bool {
        matches!(self, Self::Price | Self::MarketCap)
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl Display for QueryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(ValidationError::InvalidQueryKind { value: normalized })
    }
}

/// Set of query kinds a source supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, kind: QueryKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn of(kinds: &[QueryKind]) -> Self {
        kinds.iter().fold(Self::empty(), |set, kind| set.with(*kind))
    }

    pub const fn supports(self, kind: QueryKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn kinds(self) -> Vec<QueryKind> {
        QueryKind::ALL
            .into_iter()
            .filter(|kind| self.supports(*kind))
            .collect()
    }
}

/// Reliability rank of a provider, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityTier {
    Primary,
    Secondary,
    Tertiary,
}

impl ReliabilityTier {
    /// Confidence attached to a successful response from this tier.
    pub const fn base_confidence(self) -> f64 {
        match self {
            Self::Primary => 0.95,
            Self::Secondary => 0.85,
            Self::Tertiary => 0.7,
        }
    }
}

/// Credentials a provider needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    None,
    ApiKey,
}

/// Static description of an adapter, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub provider: ProviderId,
    pub capabilities: CapabilitySet,
    pub tier: ReliabilityTier,
    pub rate_limit: RateLimit,
    pub auth: AuthRequirement,
}

/// Inclusive date range for series queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl TimeRange {
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedTimeRange);
        }
        Ok(Self { start, end })
    }
}

/// Provider-neutral request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataQuery {
    pub kind: QueryKind,
    pub ticker: Option<Ticker>,
    pub search_text: Option<String>,
    pub range: Option<TimeRange>,
    pub country: Option<String>,
    pub currency: Option<String>,
}

impl DataQuery {
    fn for_kind(kind: QueryKind) -> Self {
        Self {
            kind,
            ticker: None,
            search_text: None,
            range: None,
            country: None,
            currency: None,
        }
    }

    fn for_ticker(kind: QueryKind, ticker: Ticker) -> Self {
        Self {
            ticker: Some(ticker),
            ..Self::for_kind(kind)
        }
    }

    pub fn price(ticker: Ticker) -> Self {
        Self::for_ticker(QueryKind::Price, ticker)
    }

    pub fn market_cap(ticker: Ticker) -> Self {
        Self::for_ticker(QueryKind::MarketCap, ticker)
    }

    pub fn revenue(ticker: Ticker) -> Self {
        Self::for_ticker(QueryKind::Revenue, ticker)
    }

    pub fn company_profile(ticker: Ticker) -> Self {
        Self::for_ticker(QueryKind::CompanyProfile, ticker)
    }

    pub fn interest_rate() -> Self {
        Self::for_kind(QueryKind::InterestRate)
    }

    pub fn inflation() -> Self {
        Self::for_kind(QueryKind::Inflation)
    }

    pub fn symbol_search(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySearchText);
        }
        Ok(Self {
            search_text: Some(trimmed.to_owned()),
            ..Self::for_kind(QueryKind::SymbolSearch)
        })
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into().trim().to_ascii_uppercase());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into().trim().to_ascii_uppercase());
        self
    }

    /// Ticker or an `invalid_request` error naming the query kind.
    pub fn require_ticker(&self) -> Result<&Ticker, SourceError> {
        self.ticker.as_ref().ok_or_else(|| {
            SourceError::invalid_request(format!("{} query requires a ticker", self.kind))
        })
    }

    /// Stable `name=value` rendering of every parameter, used in cache keys.
    pub fn normalized_params(&self) -> String {
        let mut params = Vec::with_capacity(5);
        if let Some(ticker) = &self.ticker {
            params.push(format!("ticker={ticker}"));
        }
        if let Some(text) = &self.search_text {
            params.push(format!("q={}", text.to_lowercase()));
        }
        if let Some(range) = &self.range {
            params.push(format!("range={}..{}", range.start, range.end));
        }
        if let Some(country) = &self.country {
            params.push(format!("country={country}"));
        }
        if let Some(currency) = &self.currency {
            params.push(format!("currency={currency}"));
        }
        params.join("&")
    }
}

/// One row of a symbol search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub ticker: Ticker,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
}

/// Normalized provider payload. This is what the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataPayload {
    Quote {
        price: f64,
        currency: String,
    },
    MarketCap {
        value: f64,
        currency: String,
    },
    Revenue {
        value: f64,
        currency: String,
        period: String,
    },
    Indicator {
        value: f64,
        unit: String,
        observed_at: UtcDateTime,
        series: String,
    },
    Profile {
        ticker: Ticker,
        name: String,
        #[serde(default)]
        exchange: Option<String>,
        #[serde(default)]
        currency: Option<String>,
    },
    SearchResults {
        matches: Vec<SymbolMatch>,
    },
}

impl DataPayload {
    /// The headline number of a numeric payload.
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Self::Quote { price, .. } => Some(*price),
            Self::MarketCap { value, .. }
            | Self::Revenue { value, .. }
            | Self::Indicator { value, .. } => Some(*value),
            Self::Profile { .. } | Self::SearchResults { .. } => None,
        }
    }
}

/// Outcome of one adapter call (or cache hit).
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub provider: ProviderId,
    pub kind: QueryKind,
    pub payload: Option<DataPayload>,
    pub timestamp: UtcDateTime,
    pub confidence: f64,
    pub error: Option<SourceError>,
    pub from_cache: bool,
    pub is_fallback: bool,
    pub primary_source_failed: Option<ProviderId>,
    pub latency_ms: u64,
}

impl DataResponse {
    pub fn success(
        provider: ProviderId,
        kind: QueryKind,
        payload: DataPayload,
        confidence: f64,
        latency_ms: u64,
    ) -> Self {
        Self {
            provider,
            kind,
            payload: Some(payload),
            timestamp: UtcDateTime::now(),
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
            from_cache: false,
            is_fallback: false,
            primary_source_failed: None,
            latency_ms,
        }
    }

    pub fn failure(provider: ProviderId, kind: QueryKind, error: SourceError, latency_ms: u64) -> Self {
        Self {
            provider,
            kind,
            payload: None,
            timestamp: UtcDateTime::now(),
            confidence: 0.0,
            error: Some(error),
            from_cache: false,
            is_fallback: false,
            primary_source_failed: None,
            latency_ms,
        }
    }

    /// Wraps an adapter's internal result.
    pub fn from_result(
        metadata: &SourceMetadata,
        kind: QueryKind,
        result: Result<DataPayload, SourceError>,
        latency_ms: u64,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(
                metadata.provider,
                kind,
                payload,
                metadata.tier.base_confidence(),
                latency_ms,
            ),
            Err(error) => Self::failure(metadata.provider, kind, error, latency_ms),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.payload.is_some()
    }

    pub fn value(&self) -> Option<f64> {
        self.payload.as_ref().and_then(DataPayload::numeric_value)
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    Timeout,
    CircuitOpen,
    Unsupported,
    InvalidRequest,
    NotFound,
    Parse,
}

/// Structured source error used by executor fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    denied: bool,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            denied: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message, true)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message, true)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::CircuitOpen, message, true)
    }

    pub fn unsupported(kind: QueryKind, provider: ProviderId) -> Self {
        Self::new(
            SourceErrorKind::Unsupported,
            format!("query kind '{kind}' is not supported by {provider}"),
            false,
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message, false)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Parse, message, false)
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Marks the error as a local guard denial rather than an upstream failure.
    pub fn denied_by_guard(mut self) -> Self {
        self.denied = true;
        self
    }

    pub const fn is_denial(&self) -> bool {
        self.denied
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::CircuitOpen => "source.circuit_open",
            SourceErrorKind::Unsupported => "source.unsupported",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Parse => "source.parse",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Boxed future returned by [`DataSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source adapter contract.
///
/// # Required Methods
///
/// | Method | Description |
/// |--------|-------------|
/// | [`metadata`](DataSource::metadata) | Provider, capabilities, tier, limits |
/// | [`query`](DataSource::query) | Answer a query; failures are in the response |
/// | [`health_check`](DataSource::health_check) | Whether the provider currently looks usable |
///
/// Implementations must be `Send + Sync`; the registry shares them across tasks.
pub trait DataSource: Send + Sync {
    fn metadata(&self) -> &SourceMetadata;

    fn id(&self) -> ProviderId {
        self.metadata().provider
    }

    fn supports(&self, kind: QueryKind) -> bool {
        self.metadata().capabilities.supports(kind)
    }

    fn query<'a>(&'a self, query: &'a DataQuery) -> SourceFuture<'a, DataResponse>;

    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_tracks_each_kind() {
        let set = CapabilitySet::of(&[QueryKind::Price, QueryKind::SymbolSearch]);

        assert!(set.supports(QueryKind::Price));
        assert!(set.supports(QueryKind::SymbolSearch));
        assert!(!set.supports(QueryKind::Inflation));
        assert_eq!(set.kinds(), vec![QueryKind::Price, QueryKind::SymbolSearch]);
    }

    #[test]
    fn normalized_params_ignore_search_case() {
        let upper = DataQuery::symbol_search("Alphabet").expect("valid");
        let lower = DataQuery::symbol_search("  alphabet ").expect("valid");

        assert_eq!(upper.normalized_params(), lower.normalized_params());
        assert!(DataQuery::symbol_search("   ").is_err());
    }

    #[test]
    fn payload_round_trips_with_type_tag() {
        let payload = DataPayload::Quote {
            price: 158.2,
            currency: String::from("USD"),
        };

        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "quote");
        let back: DataPayload = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.numeric_value(), Some(158.2));
    }

    #[test]
    fn parses_query_kind_names() {
        assert_eq!("market_cap".parse::<QueryKind>(), Ok(QueryKind::MarketCap));
        assert!("bars".parse::<QueryKind>().is_err());
    }

    #[test]
    fn missing_ticker_is_an_invalid_request() {
        let error = DataQuery::interest_rate()
            .require_ticker()
            .expect_err("no ticker");
        assert_eq!(error.code(), "source.invalid_request");
    }
}
