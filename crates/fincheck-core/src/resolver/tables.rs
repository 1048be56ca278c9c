//! Curated company tables. Keys are normalized (see [`super::normalize`]).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KnownCompany {
    pub ticker: &'static str,
    pub name: &'static str,
    pub exchange: &'static str,
}

const fn company(ticker: &'static str, name: &'static str, exchange: &'static str) -> KnownCompany {
    KnownCompany {
        ticker,
        name,
        exchange,
    }
}

pub(crate) const CANONICAL: &[(&str, KnownCompany)] = &[
    ("apple", company("AAPL", "Apple Inc.", "NASDAQ")),
    ("microsoft", company("MSFT", "Microsoft Corporation", "NASDAQ")),
    ("alphabet", company("GOOGL", "Alphabet Inc.", "NASDAQ")),
    ("amazon", company("AMZN", "Amazon.com, Inc.", "NASDAQ")),
    ("tesla", company("TSLA", "Tesla, Inc.", "NASDAQ")),
    ("nvidia", company("NVDA", "NVIDIA Corporation", "NASDAQ")),
    ("meta platforms", company("META", "Meta Platforms, Inc.", "NASDAQ")),
    ("berkshire hathaway", company("BRK-B", "Berkshire Hathaway Inc.", "NYSE")),
    ("jpmorgan chase", company("JPM", "JPMorgan Chase & Co.", "NYSE")),
    ("exxon mobil", company("XOM", "Exxon Mobil Corporation", "NYSE")),
    ("walmart", company("WMT", "Walmart Inc.", "NYSE")),
    ("netflix", company("NFLX", "Netflix, Inc.", "NASDAQ")),
    ("intel", company("INTC", "Intel Corporation", "NASDAQ")),
    ("visa", company("V", "Visa Inc.", "NYSE")),
    ("coca-cola", company("KO", "The Coca-Cola Company", "NYSE")),
    ("johnson & johnson", company("JNJ", "Johnson & Johnson", "NYSE")),
    ("procter & gamble", company("PG", "The Procter & Gamble Company", "NYSE")),
    ("advanced micro devices", company("AMD", "Advanced Micro Devices, Inc.", "NASDAQ")),
    ("salesforce", company("CRM", "Salesforce, Inc.", "NYSE")),
    ("oracle", company("ORCL", "Oracle Corporation", "NYSE")),
];

pub(crate) const ALIASES: &[(&str, &str)] = &[
    ("apple inc", "AAPL"),
    ("apple computer", "AAPL"),
    ("microsoft corporation", "MSFT"),
    ("microsoft corp", "MSFT"),
    ("alphabet inc", "GOOGL"),
    ("google", "GOOGL"),
    ("amazon com", "AMZN"),
    ("amazon com inc", "AMZN"),
    ("tesla inc", "TSLA"),
    ("tesla motors", "TSLA"),
    ("nvidia corporation", "NVDA"),
    ("nvidia corp", "NVDA"),
    ("meta", "META"),
    ("facebook", "META"),
    ("berkshire", "BRK-B"),
    ("jpmorgan", "JPM"),
    ("jp morgan", "JPM"),
    ("jpmorgan chase & co", "JPM"),
    ("exxon", "XOM"),
    ("exxonmobil", "XOM"),
    ("wal-mart", "WMT"),
    ("walmart inc", "WMT"),
    ("intel corporation", "INTC"),
    ("visa inc", "V"),
    ("coca cola", "KO"),
    ("coke", "KO"),
    ("the coca-cola company", "KO"),
    ("j&j", "JNJ"),
    ("p&g", "PG"),
    ("amd", "AMD"),
    ("oracle corporation", "ORCL"),
];

pub(crate) fn canonical(normalized: &str) -> Option<&'static KnownCompany> {
    CANONICAL
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, company)| company)
}

pub(crate) fn alias(normalized: &str) -> Option<&'static KnownCompany> {
    ALIASES
        .iter()
        .find(|(name, _)| *name == normalized)
        .and_then(|(_, ticker)| by_ticker(ticker))
}

pub(crate) fn by_ticker(symbol: &str) -> Option<&'static KnownCompany> {
    CANONICAL
        .iter()
        .map(|(_, company)| company)
        .find(|company| company.ticker.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::normalize;

    #[test]
    fn table_keys_are_normalized() {
        for (key, _) in CANONICAL {
            assert_eq!(normalize(key), *key);
        }
        for (key, _) in ALIASES {
            assert_eq!(normalize(key), *key);
        }
    }

    #[test]
    fn every_alias_points_at_a_known_company() {
        for (key, ticker) in ALIASES {
            assert!(by_ticker(ticker).is_some(), "alias '{key}' -> unknown {ticker}");
        }
    }
}
