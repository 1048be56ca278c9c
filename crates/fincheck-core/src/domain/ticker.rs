use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_TICKER_LEN: usize = 10;

/// Normalized exchange ticker, uppercase ASCII.
///
/// A leading `$` (cashtag) is accepted and stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTicker);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_TICKER_LEN {
            return Err(ValidationError::TickerTooLong {
                len,
                max: MAX_TICKER_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::TickerInvalidStart { ch: first });
            }
        }

        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '.' || *ch == '-'))
        {
            return Err(ValidationError::TickerInvalidChar { ch, index });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Ticker {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_cashtag_and_uppercases() {
        let ticker = Ticker::parse(" $aapl ").expect("ticker should parse");
        assert_eq!(ticker.as_str(), "AAPL");
    }

    #[test]
    fn accepts_share_class_separators() {
        assert_eq!(Ticker::parse("brk-b").expect("valid").as_str(), "BRK-B");
        assert_eq!(Ticker::parse("BF.B").expect("valid").as_str(), "BF.B");
    }

    #[test]
    fn rejects_leading_digit_and_symbols() {
        assert!(matches!(
            Ticker::parse("1AAPL"),
            Err(ValidationError::TickerInvalidStart { ch: '1' })
        ));
        assert!(matches!(
            Ticker::parse("AA PL"),
            Err(ValidationError::TickerInvalidChar { ch: ' ', index: 2 })
        ));
        assert_eq!(Ticker::parse("$"), Err(ValidationError::EmptyTicker));
    }
}
