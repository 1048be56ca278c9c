use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// What a claim asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Price,
    #[serde(alias = "market-cap")]
    MarketCap,
    Revenue,
    #[serde(alias = "growth-rate")]
    GrowthRate,
    #[serde(alias = "interest-rate")]
    InterestRate,
    Inflation,
    Opinion,
    Prediction,
}

impl ClaimKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::MarketCap => "market_cap",
            Self::Revenue => "revenue",
            Self::GrowthRate => "growth_rate",
            Self::InterestRate => "interest_rate",
            Self::Inflation => "inflation",
            Self::Opinion => "opinion",
            Self::Prediction => "prediction",
        }
    }

    /// Opinions and predictions cannot be checked against data.
    pub const fn is_factual(self) -> bool {
        !matches!(self, Self::Opinion | Self::Prediction)
    }

    /// Whether checking the claim requires a resolved company.
    pub const fn references_company(self) -> bool {
        matches!(self, Self::Price | Self::MarketCap | Self::Revenue)
    }
}

impl Display for ClaimKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magnitude word attached to an extracted number ("$2.5 trillion").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Units,
    Thousand,
    Million,
    Billion,
    Trillion,
}

impl Scale {
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Units => 1.0,
            Self::Thousand => 1e3,
            Self::Million => 1e6,
            Self::Billion => 1e9,
            Self::Trillion => 1e12,
        }
    }
}

/// Unit of an extracted number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueUnit {
    Currency(String),
    Percent,
    Count,
}

impl ValueUnit {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "percent" | "%" | "pct" => return Ok(Self::Percent),
            "count" => return Ok(Self::Count),
            _ => {}
        }

        if trimmed.len() == 3 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Ok(Self::Currency(trimmed.to_ascii_uppercase()));
        }

        Err(ValidationError::InvalidUnit {
            value: input.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Currency(code) => code,
            Self::Percent => "percent",
            Self::Count => "count",
        }
    }
}

impl TryFrom<String> for ValueUnit {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ValueUnit> for String {
    fn from(value: ValueUnit) -> Self {
        value.as_str().to_owned()
    }
}

/// A number extracted from claim text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimValue {
    pub amount: f64,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<ValueUnit>,
}

impl ClaimValue {
    pub fn new(amount: f64, scale: Scale, unit: Option<ValueUnit>) -> Result<Self, ValidationError> {
        if !amount.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "amount" });
        }
        Ok(Self {
            amount,
            scale,
            unit,
        })
    }

    pub fn currency(amount: f64, scale: Scale, code: &str) -> Result<Self, ValidationError> {
        Self::new(amount, scale, Some(ValueUnit::parse(code)?))
    }

    pub fn percent(amount: f64) -> Result<Self, ValidationError> {
        Self::new(amount, Scale::Units, Some(ValueUnit::Percent))
    }

    /// Amount with the scale word applied.
    pub fn absolute(&self) -> f64 {
        self.amount * self.scale.multiplier()
    }
}

/// Normalized claim record produced by the extractor.
///
/// Deserializing validates the record, so extractor JSON can be consumed directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClaim")]
pub struct FinancialClaim {
    pub text: String,
    pub kind: ClaimKind,
    pub entities: Vec<String>,
    pub values: Vec<ClaimValue>,
    pub extraction_confidence: f64,
}

impl FinancialClaim {
    pub fn new(text: impl Into<String>, kind: ClaimKind) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyClaimText);
        }
        Ok(Self {
            text,
            kind,
            entities: Vec::new(),
            values: Vec::new(),
            extraction_confidence: 1.0,
        })
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn with_value(mut self, value: ClaimValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn with_extraction_confidence(mut self, confidence: f64) -> Result<Self, ValidationError> {
        validate_confidence("extraction_confidence", confidence)?;
        self.extraction_confidence = confidence;
        Ok(self)
    }

    /// First referenced entity with non-blank text.
    pub fn primary_entity(&self) -> Option<&str> {
        self.entities
            .iter()
            .map(|entity| entity.trim())
            .find(|entity| !entity.is_empty())
    }

    pub fn primary_value(&self) -> Option<&ClaimValue> {
        self.values.first()
    }
}

#[derive(Deserialize)]
struct RawClaim {
    text: String,
    kind: ClaimKind,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    values: Vec<ClaimValue>,
    #[serde(default = "default_extraction_confidence")]
    extraction_confidence: f64,
}

fn default_extraction_confidence() -> f64 {
    1.0
}

impl TryFrom<RawClaim> for FinancialClaim {
    type Error = ValidationError;

    fn try_from(raw: RawClaim) -> Result<Self, Self::Error> {
        let mut claim = Self::new(raw.text, raw.kind)?
            .with_extraction_confidence(raw.extraction_confidence)?;
        for value in raw.values {
            claim = claim.with_value(ClaimValue::new(value.amount, value.scale, value.unit)?);
        }
        claim.entities = raw.entities;
        Ok(claim)
    }
}

pub(crate) fn validate_confidence(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ConfidenceOutOfRange { field });
    }
    Ok(())
}
