//! # fincheck Core
//!
//! Verification of financial claims against live market and macro data.
//!
//! ## Overview
//!
//! A normalized claim ("AAPL is trading at $150") goes through:
//!
//! - **Entity resolution**: the company mention becomes a canonical ticker
//! - **Query execution**: ranked provider adapters are queried with fallback or
//!   cross-verification, behind a tiered cache and per-provider guards
//! - **Verification**: the claimed value is compared with the retrieved one and
//!   scored
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo, Alpha Vantage, Polygon, FRED) |
//! | [`cache`] | In-process cache with a durable tier |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Runtime configuration from `FINCHECK_*` variables |
//! | [`data_source`] | Data source trait and query/response types |
//! | [`domain`] | Claims, tickers and verdicts |
//! | [`error`] | Error types |
//! | [`executor`] | Fallback and cross-verification execution |
//! | [`guard`] | Per-provider rate limiting and breaker admission |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider_policy`] | Per-provider limits and breaker thresholds |
//! | [`registry`] | Adapters ranked per query kind |
//! | [`report`] | Verification report and run metadata |
//! | [`resolver`] | Company mention to ticker resolution |
//! | [`service`] | The [`FactChecker`] service |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Token buckets |
//! | [`verification`] | Claim scoring |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fincheck_core::{ClaimKind, ClaimValue, FactChecker, FinancialClaim, Scale};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checker = FactChecker::from_env()?;
//!
//!     let claim = FinancialClaim::new("AAPL is trading at $150", ClaimKind::Price)?
//!         .with_entity("AAPL")
//!         .with_value(ClaimValue::currency(150.0, Scale::Units, "USD")?);
//!
//!     let report = checker.verify(&[claim]).await;
//!     for result in &report.results {
//!         println!("{} ({:.2}): {}", result.status, result.confidence, result.explanation);
//!     }
//!
//!     checker.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod executor;
pub mod guard;
pub mod http_client;
pub mod provider_policy;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod service;
pub mod source;
pub mod throttling;
pub mod verification;

pub use adapters::{AlphaVantageAdapter, FredAdapter, PolygonAdapter, YahooAdapter};
pub use cache::{CacheStats, DurableStore, MemoryStore, TieredCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::FactCheckConfig;
pub use data_source::{
    CapabilitySet, DataPayload, DataQuery, DataResponse, DataSource, QueryKind, ReliabilityTier,
    SourceError, SourceErrorKind, SourceMetadata,
};
pub use domain::{
    ClaimKind, ClaimValue, FactCheckResult, FinancialClaim, ResolutionMethod, Scale, Ticker,
    TickerMatch, UtcDateTime, ValueUnit, VerificationStatus,
};
pub use error::{CacheError, CheckFailure, ConfigError, ResolveError, ValidationError};
pub use executor::{ChainExhausted, CrossVerification, ExecutorSettings, QueryExecutor, SourcedResponse};
pub use guard::{ProviderGuard, ProviderGuards};
pub use http_client::{
    FixtureHttpClient, HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use provider_policy::{ProviderPolicy, RateLimit};
pub use registry::{SourceRegistry, SourceRegistryBuilder};
pub use report::{ReportMeta, ReportSummary, VerificationReport};
pub use resolver::{EntityResolver, ResolverSettings};
pub use service::{FactChecker, FactCheckerBuilder};
pub use source::ProviderId;
pub use throttling::TokenBucket;
pub use verification::{VerificationEngine, VerificationSettings};
