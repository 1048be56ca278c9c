use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{CheckFailure, FinancialClaim, ProviderId, TickerMatch};

/// Terminal state of a claim check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Unverified,
    Inconclusive,
}

impl VerificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Unverified => "unverified",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckResult {
    pub claim: FinancialClaim,
    pub status: VerificationStatus,
    pub verified: bool,
    pub confidence: f64,
    pub discrepancy: Option<f64>,
    pub actual_value: Option<f64>,
    /// Providers consulted, in the order they were tried.
    pub sources: Vec<ProviderId>,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ticker: Option<TickerMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<CheckFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FactCheckResult {
    /// Result with the given status; `verified` follows the status and
    /// confidence is clamped to [0, 1].
    pub fn new(
        claim: FinancialClaim,
        status: VerificationStatus,
        confidence: f64,
        explanation: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            claim,
            status,
            verified: status == VerificationStatus::Verified,
            confidence,
            discrepancy: None,
            actual_value: None,
            sources: Vec::new(),
            explanation: explanation.into(),
            resolved_ticker: None,
            failure: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_comparison(mut self, actual_value: f64, discrepancy: f64) -> Self {
        self.actual_value = Some(actual_value);
        self.discrepancy = Some(discrepancy);
        self
    }

    pub fn with_sources(mut self, sources: Vec<ProviderId>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_ticker(mut self, ticker: Option<TickerMatch>) -> Self {
        self.resolved_ticker = ticker;
        self
    }

    pub fn with_failure(mut self, failure: CheckFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClaimKind;

    #[test]
    fn verified_flag_tracks_status_and_confidence_is_clamped() {
        let claim = FinancialClaim::new("AAPL is at $150", ClaimKind::Price).expect("claim");

        let verified = FactCheckResult::new(claim.clone(), VerificationStatus::Verified, 1.7, "ok");
        assert!(verified.verified);
        assert_eq!(verified.confidence, 1.0);

        let inconclusive =
            FactCheckResult::new(claim, VerificationStatus::Inconclusive, f64::NAN, "n/a");
        assert!(!inconclusive.verified);
        assert_eq!(inconclusive.confidence, 0.0);
    }
}
