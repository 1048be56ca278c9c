use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identifiers of the external data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Yahoo,
    AlphaVantage,
    Polygon,
    Fred,
}

impl ProviderId {
    pub const ALL: [Self; 4] = [Self::Yahoo, Self::AlphaVantage, Self::Polygon, Self::Fred];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::AlphaVantage => "alphavantage",
            Self::Polygon => "polygon",
            Self::Fred => "fred",
        }
    }

    /// Environment variables holding the provider's API key, in lookup order.
    pub const fn api_key_env_vars(self) -> Option<[&'static str; 2]> {
        match self {
            Self::Yahoo => None,
            Self::AlphaVantage => Some(["FINCHECK_ALPHAVANTAGE_API_KEY", "ALPHAVANTAGE_API_KEY"]),
            Self::Polygon => Some(["FINCHECK_POLYGON_API_KEY", "POLYGON_API_KEY"]),
            Self::Fred => Some(["FINCHECK_FRED_API_KEY", "FRED_API_KEY"]),
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "alphavantage" | "alpha_vantage" => Ok(Self::AlphaVantage),
            "polygon" => Ok(Self::Polygon),
            "fred" => Ok(Self::Fred),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!("Yahoo".parse::<ProviderId>(), Ok(ProviderId::Yahoo));
        assert_eq!(" alpha_vantage ".parse::<ProviderId>(), Ok(ProviderId::AlphaVantage));
        assert!(matches!(
            "bloomberg".parse::<ProviderId>(),
            Err(ValidationError::InvalidSource { .. })
        ));
    }

    #[test]
    fn serializes_as_lowercase_name() {
        let json = serde_json::to_string(&ProviderId::AlphaVantage).expect("serialize");
        assert_eq!(json, "\"alphavantage\"");
    }

    #[test]
    fn keyless_provider_has_no_env_vars() {
        assert!(ProviderId::Yahoo.api_key_env_vars().is_none());
        assert_eq!(
            ProviderId::Fred.api_key_env_vars(),
            Some(["FINCHECK_FRED_API_KEY", "FRED_API_KEY"])
        );
    }
}
