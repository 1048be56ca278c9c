use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use time::format_description::well_known::Iso8601;
use time::Date;

use super::{elapsed_ms, execute, into_body, parse_decimal, parse_json, CallHealth};
use crate::data_source::{
    AuthRequirement, CapabilitySet, DataPayload, DataQuery, DataResponse, DataSource, QueryKind,
    ReliabilityTier, SourceError, SourceFuture, SourceMetadata, TimeRange,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{ProviderId, UtcDateTime};

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const FED_FUNDS_SERIES: &str = "FEDFUNDS";
const CPI_SERIES: &str = "CPIAUCSL";
/// Thirteen monthly CPI points cover the latest month and the same month a year earlier.
const CPI_WINDOW: usize = 13;

/// FRED adapter for US macro indicators.
///
/// Interest rate is the effective federal funds rate. Inflation is the
/// year-over-year change of CPI-U, computed from monthly index levels.
pub struct FredAdapter {
    metadata: SourceMetadata,
    http: Arc<dyn HttpClient>,
    api_key: String,
    health: CallHealth,
}

impl FredAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            metadata: SourceMetadata {
                provider: ProviderId::Fred,
                capabilities: CapabilitySet::of(&[QueryKind::InterestRate, QueryKind::Inflation]),
                tier: ReliabilityTier::Primary,
                rate_limit: ProviderPolicy::fred_default().rate_limit,
                auth: AuthRequirement::ApiKey,
            },
            http,
            api_key: api_key.into(),
            health: CallHealth::new(),
        }
    }

    async fn fetch(&self, query: &DataQuery) -> Result<DataPayload, SourceError> {
        if !matches!(query.kind, QueryKind::InterestRate | QueryKind::Inflation) {
            return Err(SourceError::unsupported(query.kind, ProviderId::Fred));
        }
        if let Some(country) = query.country.as_deref() {
            if !matches!(country, "US" | "USA") {
                return Err(SourceError::invalid_request(format!(
                    "fred only serves US indicators, not '{country}'"
                )));
            }
        }

        if query.kind == QueryKind::InterestRate {
            let observations = self.observations(FED_FUNDS_SERIES, 1, query.range).await?;
            let (date, value) = observations.into_iter().next().ok_or_else(|| {
                SourceError::not_found("fred returned no FEDFUNDS observations")
            })?;
            return Ok(indicator(value, date, FED_FUNDS_SERIES));
        }

        let observations = self.observations(CPI_SERIES, CPI_WINDOW, query.range).await?;
        let (latest_date, latest) = observations
            .first()
            .copied()
            .ok_or_else(|| SourceError::not_found("fred returned no CPIAUCSL observations"))?;
        let (_, year_ago) = observations
            .iter()
            .copied()
            .find(|(date, _)| date.year() == latest_date.year() - 1 && date.month() == latest_date.month())
            .ok_or_else(|| {
                SourceError::not_found(format!(
                    "fred has no CPIAUCSL observation one year before {latest_date}"
                ))
            })?;
        if year_ago <= 0.0 {
            return Err(SourceError::parse("fred CPIAUCSL base level is not positive"));
        }

        let yoy = (latest / year_ago - 1.0) * 100.0;
        Ok(indicator(yoy, latest_date, CPI_SERIES))
    }

    /// Observations newest first, skipping FRED's "." placeholders.
    async fn observations(
        &self,
        series: &str,
        limit: usize,
        range: Option<TimeRange>,
    ) -> Result<Vec<(Date, f64)>, SourceError> {
        let mut url = format!(
            "{OBSERVATIONS_URL}?series_id={series}&api_key={}&file_type=json&sort_order=desc&limit={limit}",
            urlencoding::encode(&self.api_key)
        );
        if let Some(range) = range {
            url.push_str(&format!(
                "&observation_start={}&observation_end={}",
                range.start.date(),
                range.end.date()
            ));
        }

        let response = execute(&self.http, HttpRequest::get(url), ProviderId::Fred, &self.health).await?;
        // FRED explains bad series ids and keys in a 400 body.
        if (400..500).contains(&response.status) && response.status != 429 {
            if let Ok(ObservationsEnvelope {
                error_message: Some(message),
                ..
            }) = serde_json::from_str(&response.body)
            {
                self.health.record(true);
                return Err(SourceError::invalid_request(format!(
                    "fred returned {}: {message}",
                    response.status
                )));
            }
        }
        let body = into_body(response, ProviderId::Fred, &self.health)?;
        let envelope: ObservationsEnvelope = parse_json(&body, ProviderId::Fred)?;
        if let Some(message) = envelope.error_message {
            return Err(SourceError::invalid_request(format!("fred: {message}")));
        }

        envelope
            .observations
            .into_iter()
            .filter(|row| row.value.trim() != ".")
            .map(|row| {
                let date = Date::parse(&row.date, &Iso8601::DATE).map_err(|_| {
                    SourceError::parse(format!("fred observation date '{}' is invalid", row.date))
                })?;
                Ok((date, parse_decimal(&row.value, "value", ProviderId::Fred)?))
            })
            .collect()
    }
}

impl DataSource for FredAdapter {
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

fn indicator(value: f64, date: Date, series: &str) -> DataPayload {
    DataPayload::Indicator {
        value,
        unit: String::from("percent"),
        observed_at: UtcDateTime::start_of_day(date),
        series: series.to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsEnvelope {
    #[serde(default)]
    observations: Vec<Observation>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::FixtureHttpClient;

    fn adapter(http: FixtureHttpClient) -> (FredAdapter, Arc<FixtureHttpClient>) {
        let http = Arc::new(http);
        (FredAdapter::new(http.clone(), "fred-key"), http)
    }

    #[tokio::test]
    async fn interest_rate_reads_latest_fed_funds_observation() {
        let (fred, http) = adapter(FixtureHttpClient::new().with_json(
            "series_id=FEDFUNDS",
            r#"{"observations":[{"date":"2024-06-01","value":"5.33"}]}"#,
        ));

        let response = fred.query(&DataQuery::interest_rate()).await;

        assert_eq!(response.value(), Some(5.33));
        let url = &http.requests()[0].url;
        assert!(url.contains("api_key=fred-key"));
        assert!(url.contains("limit=1"));
    }

    #[tokio::test]
    async fn inflation_is_year_over_year_cpi_change() {
        let (fred, _) = adapter(FixtureHttpClient::new().with_json(
            "series_id=CPIAUCSL",
            r#"{"observations":[
                {"date":"2024-06-01","value":"314.175"},
                {"date":"2024-05-01","value":"."},
                {"date":"2023-07-01","value":"304.348"},
                {"date":"2023-06-01","value":"304.003"}
            ]}"#,
        ));

        let response = fred.query(&DataQuery::inflation()).await;

        let value = response.value().expect("inflation value");
        assert!((value - 3.3457).abs() < 1e-3, "yoy was {value}");
        match response.payload {
            Some(DataPayload::Indicator { series, unit, .. }) => {
                assert_eq!(series, "CPIAUCSL");
                assert_eq!(unit, "percent");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_us_country_is_rejected_without_a_request() {
        let (fred, http) = adapter(FixtureHttpClient::new());

        let response = fred
            .query(&DataQuery::interest_rate().with_country("gb"))
            .await;

        assert_eq!(
            response.error.map(|error| error.kind()),
            Some(SourceErrorKind::InvalidRequest)
        );
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_request_reports_fred_error_message() {
        let (fred, _) = adapter(FixtureHttpClient::new().with_status(
            "series_id=FEDFUNDS",
            400,
            r#"{"error_code":400,"error_message":"Bad Request.  The value for variable api_key is not registered."}"#,
        ));

        let response = fred.query(&DataQuery::interest_rate()).await;

        let error = response.error.expect("rejected request");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
        assert!(!error.retryable());
        assert!(error.message().contains("api_key is not registered"));
        assert!(fred.health_check().await);
    }

    #[tokio::test]
    async fn bare_bad_request_stays_unavailable() {
        let (fred, _) = adapter(FixtureHttpClient::new().with_status("series_id=FEDFUNDS", 400, "oops"));

        let response = fred.query(&DataQuery::interest_rate()).await;

        assert_eq!(
            response.error.map(|error| error.kind()),
            Some(SourceErrorKind::Unavailable)
        );
    }

    #[tokio::test]
    async fn missing_year_ago_point_is_not_found() {
        let (fred, _) = adapter(FixtureHttpClient::new().with_json(
            "series_id=CPIAUCSL",
            r#"{"observations":[{"date":"2024-06-01","value":"314.175"}]}"#,
        ));

        let response = fred.query(&DataQuery::inflation()).await;

        assert_eq!(
            response.error.map(|error| error.kind()),
            Some(SourceErrorKind::NotFound)
        );
    }
}
