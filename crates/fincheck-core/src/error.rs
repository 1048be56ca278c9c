use fincheck_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation and contract errors exposed by `fincheck-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("invalid source '{value}', expected one of yahoo, alphavantage, polygon, fred")]
    InvalidSource { value: String },
    #[error("invalid query kind '{value}'")]
    InvalidQueryKind { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("time range start must not be after its end")]
    InvertedTimeRange,

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be within [0, 1]")]
    ConfidenceOutOfRange { field: &'static str },

    #[error("claim text cannot be empty")]
    EmptyClaimText,
    #[error("unit must be 'percent', 'count' or a 3-letter currency code: '{value}'")]
    InvalidUnit { value: String },
    #[error("search text cannot be empty")]
    EmptySearchText,
}

/// Entity resolution failure. Only empty input is an error; an unresolvable
/// name is reported as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("entity text cannot be empty")]
    EmptyInput,
}

/// Invalid environment configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}='{value}' is not valid: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Durable cache tier failures. Logged by the cache and never surfaced past it.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cache payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("durable store task failed: {0}")]
    Task(String),
}

/// Failure classification carried by a fact-check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFailure {
    /// A provider failed but a later one answered.
    ProviderUnavailable,
    /// The referenced entity could not be resolved to a ticker.
    NoMatchFound,
    /// The claim carries no entity or no numeric value to check.
    AmbiguousClaim,
    /// Every ranked provider failed or was denied.
    AllSourcesExhausted,
}

impl CheckFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider_unavailable",
            Self::NoMatchFound => "no_match_found",
            Self::AmbiguousClaim => "ambiguous_claim",
            Self::AllSourcesExhausted => "all_sources_exhausted",
        }
    }
}
