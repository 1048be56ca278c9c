use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::claim::validate_confidence;
use crate::{Ticker, ValidationError};

/// Strategy that produced a ticker match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMethod {
    #[serde(rename = "exact_match")]
    Exact,
    #[serde(rename = "alias_mapping")]
    Alias,
    #[serde(rename = "fuzzy_match")]
    Fuzzy,
    #[serde(rename = "external_lookup")]
    External,
}

impl ResolutionMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact_match",
            Self::Alias => "alias_mapping",
            Self::Fuzzy => "fuzzy_match",
            Self::External => "external_lookup",
        }
    }
}

impl Display for ResolutionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A company mention resolved to a canonical ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMatch {
    pub ticker: Ticker,
    pub confidence: f64,
    pub method: ResolutionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

impl TickerMatch {
    pub fn new(
        ticker: Ticker,
        confidence: f64,
        method: ResolutionMethod,
    ) -> Result<Self, ValidationError> {
        validate_confidence("confidence", confidence)?;
        Ok(Self {
            ticker,
            confidence,
            method,
            company_name: None,
            exchange: None,
        })
    }

    pub fn with_company(mut self, name: impl Into<String>, exchange: Option<String>) -> Self {
        self.company_name = Some(name.into());
        self.exchange = exchange;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_method_with_wire_names() {
        let found = TickerMatch::new(
            Ticker::parse("GOOGL").expect("valid"),
            0.95,
            ResolutionMethod::Alias,
        )
        .expect("valid match");

        let json = serde_json::to_value(&found).expect("serialize");
        assert_eq!(json["method"], "alias_mapping");
        assert_eq!(json["ticker"], "GOOGL");
        assert!(json.get("exchange").is_none());
    }

    #[test]
    fn rejects_confidence_above_one() {
        let result = TickerMatch::new(
            Ticker::parse("AAPL").expect("valid"),
            1.2,
            ResolutionMethod::Exact,
        );
        assert!(matches!(
            result,
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
    }
}
