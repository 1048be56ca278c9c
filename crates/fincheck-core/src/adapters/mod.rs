//! Provider adapters.
//!
//! Each adapter maps a [`DataQuery`](crate::data_source::DataQuery) onto one
//! provider's HTTP API and parses the answer with private serde structs.

pub mod alphavantage;
pub mod fred;
pub mod polygon;
pub mod yahoo;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::warn;

pub use alphavantage::AlphaVantageAdapter;
pub use fred::FredAdapter;
pub use polygon::PolygonAdapter;
pub use yahoo::YahooAdapter;

use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::ProviderId;

/// Sends `request`, classifying transport failures. Any HTTP status is returned.
pub(crate) async fn execute(
    http: &Arc<dyn HttpClient>,
    request: HttpRequest,
    provider: ProviderId,
    health: &CallHealth,
) -> Result<HttpResponse, SourceError> {
    http.execute(request).await.map_err(|error| {
        health.record(false);
        warn!(%provider, error = error.message(), "provider transport error");
        if error.timed_out() {
            SourceError::timeout(format!("{provider} request timed out: {}", error.message()))
        } else {
            SourceError::unavailable(format!("{provider} transport error: {}", error.message()))
        }
    })
}

/// Body of a 2xx reply, or the error its status maps to.
pub(crate) fn into_body(
    response: HttpResponse,
    provider: ProviderId,
    health: &CallHealth,
) -> Result<String, SourceError> {
    match response.status {
        status if (200..300).contains(&status) => {
            health.record(true);
            Ok(response.body)
        }
        429 => {
            health.record(true);
            Err(SourceError::rate_limited(format!(
                "{provider} returned 429 Too Many Requests"
            )))
        }
        404 => {
            health.record(true);
            Err(SourceError::not_found(format!("{provider} returned 404")))
        }
        status => {
            health.record(status < 500);
            Err(SourceError::unavailable(format!(
                "{provider} upstream returned status {status}"
            )))
        }
    }
}

pub(crate) async fn send(
    http: &Arc<dyn HttpClient>,
    request: HttpRequest,
    provider: ProviderId,
    health: &CallHealth,
) -> Result<String, SourceError> {
    let response = execute(http, request, provider, health).await?;
    into_body(response, provider, health)
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str, provider: ProviderId) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|error| SourceError::parse(format!("failed to parse {provider} response: {error}")))
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Parses the decimal strings several providers use for numbers.
pub(crate) fn parse_decimal(raw: &str, field: &str, provider: ProviderId) -> Result<f64, SourceError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| SourceError::parse(format!("{provider} field '{field}' is not numeric: '{raw}'")))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SourceError::parse(format!("{provider} field '{field}' is not finite")))
    }
}

/// Outcome of the most recent upstream exchange. Health checks read this
/// instead of spending a request against the provider's quota, so an adapter
/// reads as healthy until its first call says otherwise.
#[derive(Debug)]
pub(crate) struct CallHealth(AtomicBool);

impl CallHealth {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub(crate) fn record(&self, reachable: bool) {
        self.0.store(reachable, Ordering::Relaxed);
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
