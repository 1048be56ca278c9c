use crate::Ticker;

const CORPORATE_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "limited",
    "plc",
    "llc",
    "holdings",
    "group",
    "sa",
    "ag",
    "nv",
];

const MAX_CANDIDATES: usize = 4;

/// Normalized name without a leading "the" or trailing corporate suffixes.
pub fn strip_corporate_suffixes(normalized: &str) -> String {
    let mut words = normalized.split(' ').collect::<Vec<_>>();
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    while words.len() > 1
        && words
            .last()
            .is_some_and(|last| CORPORATE_SUFFIXES.contains(last) || *last == "&")
    {
        words.pop();
    }
    words.join(" ")
}

/// Guessed tickers for a company name, most plausible first.
///
/// Initials of a multi-word name, the first word cut to four letters, and a
/// short single-word name taken whole.
pub fn ticker_candidates(normalized: &str) -> Vec<Ticker> {
    let stripped = strip_corporate_suffixes(normalized);
    let words = stripped
        .split(' ')
        .map(|word| word.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();

    let mut raw = Vec::with_capacity(3);
    if words.len() > 1 {
        raw.push(words.iter().filter_map(|word| word.chars().next()).collect::<String>());
    }
    if let Some(first) = words.first() {
        raw.push(first.chars().take(4).collect::<String>());
        if words.len() == 1 && first.len() <= 5 {
            raw.push(first.clone());
        }
    }

    let mut candidates: Vec<Ticker> = Vec::with_capacity(MAX_CANDIDATES);
    for guess in raw {
        let Ok(ticker) = Ticker::parse(&guess) else {
            continue;
        };
        if !candidates.contains(&ticker) {
            candidates.push(ticker);
        }
        if candidates.len() == MAX_CANDIDATES {
            break;
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(candidates: Vec<Ticker>) -> Vec<String> {
        candidates.into_iter().map(String::from).collect()
    }

    #[test]
    fn strips_suffixes_and_leading_article() {
        assert_eq!(strip_corporate_suffixes("the boeing company"), "boeing");
        assert_eq!(strip_corporate_suffixes("acme holdings inc"), "acme");
        assert_eq!(strip_corporate_suffixes("inc"), "inc");
    }

    #[test]
    fn multi_word_names_yield_initials_then_prefix() {
        assert_eq!(
            symbols(ticker_candidates("international business machines corp")),
            vec!["IBM", "INTE"]
        );
    }

    #[test]
    fn short_single_word_is_tried_whole() {
        assert_eq!(symbols(ticker_candidates("boeing co")), vec!["BOEI"]);
        assert_eq!(symbols(ticker_candidates("ford motor")), vec!["FM", "FORD"]);
        assert_eq!(symbols(ticker_candidates("uber")), vec!["UBER"]);
    }

    #[test]
    fn names_without_letters_yield_nothing() {
        assert!(ticker_candidates("123").is_empty());
    }
}
