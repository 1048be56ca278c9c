use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::StatsSnapshot;
use crate::{FactCheckResult, ProviderId, UtcDateTime, VerificationStatus};

/// Run-level metadata attached to every report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub request_id: String,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_calls: u64,
    pub providers_consulted: Vec<ProviderId>,
    /// Providers that refused calls through rate limiting or an open breaker.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers_denied: Vec<ProviderId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ReportMeta {
    pub fn new(stats: StatsSnapshot, latency_ms: u64) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            generated_at: UtcDateTime::now(),
            latency_ms,
            cache_hits: stats.cache_hits,
            cache_misses: stats.cache_misses,
            provider_calls: stats.provider_calls,
            providers_consulted: stats.providers_consulted,
            providers_denied: stats.providers_denied,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Results of one `verify` call, in claim order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub meta: ReportMeta,
    pub results: Vec<FactCheckResult>,
}

impl VerificationReport {
    /// Builds the report, lifting per-result warnings into the metadata.
    pub fn new(mut meta: ReportMeta, results: Vec<FactCheckResult>) -> Self {
        for warning in results.iter().flat_map(|result| result.warnings.iter()) {
            if !meta.warnings.contains(warning) {
                meta.warnings.push(warning.clone());
            }
        }
        Self { meta, results }
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.results.len(),
            ..ReportSummary::default()
        };
        for result in &self.results {
            match result.status {
                VerificationStatus::Verified => summary.verified += 1,
                VerificationStatus::Unverified => summary.unverified += 1,
                VerificationStatus::Inconclusive => summary.inconclusive += 1,
            }
        }
        summary
    }
}

/// Status counts across a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub verified: usize,
    pub unverified: usize,
    pub inconclusive: usize,
}
