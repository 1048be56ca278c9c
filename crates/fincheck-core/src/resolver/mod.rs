//! Entity resolution: free-text company mentions to canonical tickers.
//!
//! Strategies run in order and the first one that produces an acceptable match
//! wins:
//!
//! | Step | Strategy | Confidence |
//! |------|----------|------------|
//! | 1 | cashtag, known symbol or canonical name | 1.0 |
//! | 2 | alias table | 0.95 |
//! | 3 | bigram Jaccard > 0.8 against both tables | similarity × 0.9 (canonical) / × 0.85 (alias) |
//! | 4 | provider lookup of guessed tickers, then symbol search | 0.85 |
//!
//! Matches below [`MIN_CONFIDENCE`] are never returned. Accepted matches are
//! cached per normalized input.

mod candidates;
mod similarity;
mod tables;

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::debug;

pub use candidates::{strip_corporate_suffixes, ticker_candidates};
pub use similarity::bigram_jaccard;

use crate::cache::{ticker_match_key, TieredCache};
use crate::data_source::{DataPayload, DataQuery};
use crate::error::ResolveError;
use crate::executor::QueryExecutor;
use crate::{ResolutionMethod, Ticker, TickerMatch};
use tables::KnownCompany;

pub const MIN_CONFIDENCE: f64 = 0.7;
const ALIAS_CONFIDENCE: f64 = 0.95;
const FUZZY_SIMILARITY_FLOOR: f64 = 0.8;
const FUZZY_CANONICAL_WEIGHT: f64 = 0.9;
const FUZZY_ALIAS_WEIGHT: f64 = 0.85;
const EXTERNAL_CONFIDENCE: f64 = 0.85;
const MAX_SYMBOL_LEN: usize = 5;

/// Lowercases, turns punctuation other than `&` and `-` into spaces and
/// collapses whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '&' || ch == '-' {
                ch.to_lowercase().next().unwrap_or(ch)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    pub concurrency: usize,
    pub cache_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cache_ttl: Duration::from_secs(86_400),
        }
    }
}

/// Resolves company mentions, consulting providers through the executor
/// when the curated tables have no answer.
#[derive(Clone)]
pub struct EntityResolver {
    executor: QueryExecutor,
    cache: TieredCache,
    settings: ResolverSettings,
}

impl EntityResolver {
    pub fn new(executor: QueryExecutor, settings: ResolverSettings) -> Self {
        let cache = executor.cache().clone();
        Self {
            executor,
            cache,
            settings,
        }
    }

    /// Same resolver issuing provider lookups through `executor`.
    pub fn with_executor(&self, executor: QueryExecutor) -> Self {
        Self {
            executor,
            ..self.clone()
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Best match for `entity`, `Ok(None)` when nothing reaches the
    /// acceptance threshold. Errors only on blank input.
    pub async fn resolve(&self, entity: &str) -> Result<Option<TickerMatch>, ResolveError> {
        let trimmed = entity.trim();
        let normalized = normalize(trimmed);
        if normalized.is_empty() {
            return Err(ResolveError::EmptyInput);
        }

        let key = ticker_match_key(&normalized);
        if let Some(cached) = self.cache.get_json::<TickerMatch>(&key).await {
            debug!(entity = trimmed, ticker = %cached.ticker, "ticker match cache hit");
            return Ok(Some(cached));
        }

        let mut found = resolve_locally(trimmed, &normalized);
        if found.is_none() {
            if let Some(ticker) = bare_symbol(trimmed) {
                found = self.validate_symbol(ticker).await;
            }
        }
        if found.is_none() {
            found = self.resolve_externally(&normalized).await;
        }
        let Some(found) = found.filter(|found| found.confidence >= MIN_CONFIDENCE) else {
            debug!(entity = trimmed, "no ticker match");
            return Ok(None);
        };

        debug!(
            entity = trimmed,
            ticker = %found.ticker,
            method = %found.method,
            confidence = found.confidence,
            "entity resolved"
        );
        if let Err(error) = self
            .cache
            .put_json(&key, &found, self.settings.cache_ttl)
            .await
        {
            debug!(%error, "ticker match not cached");
        }
        Ok(Some(found))
    }

    /// Resolves every entity with bounded concurrency, preserving order.
    /// Blank or unresolvable entries come back as `None`.
    pub async fn resolve_multiple(&self, entities: &[String]) -> Vec<Option<TickerMatch>> {
        stream::iter(entities)
            .map(|entity| async move { self.resolve(entity).await.ok().flatten() })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    /// A bare symbol missing from the tables is exact when a provider's
    /// profile comes back under the same symbol.
    async fn validate_symbol(&self, ticker: Ticker) -> Option<TickerMatch> {
        let sourced = self
            .executor
            .execute_fallback(&DataQuery::company_profile(ticker.clone()))
            .await
            .ok()?;
        let Some(DataPayload::Profile {
            ticker: returned,
            name,
            exchange,
            ..
        }) = sourced.response.payload
        else {
            return None;
        };
        if !returned.as_str().eq_ignore_ascii_case(ticker.as_str()) {
            return None;
        }
        debug!(%ticker, company = %name, "bare symbol validated");
        let found = TickerMatch::new(ticker, 1.0, ResolutionMethod::Exact).ok()?;
        Some(found.with_company(name, exchange))
    }

    async fn resolve_externally(&self, normalized: &str) -> Option<TickerMatch> {
        let stripped = strip_corporate_suffixes(normalized);

        for candidate in ticker_candidates(normalized) {
            let Ok(sourced) = self
                .executor
                .execute_fallback(&DataQuery::company_profile(candidate.clone()))
                .await
            else {
                continue;
            };
            if let Some(DataPayload::Profile { name, exchange, .. }) = sourced.response.payload {
                if name_matches(&name, &stripped) || symbol_matches(&candidate, normalized) {
                    debug!(%candidate, company = %name, "candidate ticker validated");
                    return external_match(candidate, name, exchange);
                }
            }
        }

        let query = DataQuery::symbol_search(normalized).ok()?;
        let sourced = self.executor.execute_fallback(&query).await.ok()?;
        let Some(DataPayload::SearchResults { matches }) = sourced.response.payload else {
            return None;
        };
        let hit = matches
            .into_iter()
            .find(|candidate| {
                name_matches(&candidate.name, &stripped) || symbol_matches(&candidate.ticker, normalized)
            })?;
        debug!(ticker = %hit.ticker, company = %hit.name, "symbol search matched");
        external_match(hit.ticker, hit.name, hit.exchange)
    }
}

/// Steps 1 to 3: everything answerable from the curated tables.
fn resolve_locally(raw: &str, normalized: &str) -> Option<TickerMatch> {
    if let Some(found) = detect_symbol(raw) {
        return Some(found);
    }
    if let Some(company) = tables::canonical(normalized) {
        return known_match(company, 1.0, ResolutionMethod::Exact);
    }
    if let Some(company) = tables::alias(normalized) {
        return known_match(company, ALIAS_CONFIDENCE, ResolutionMethod::Alias);
    }
    fuzzy_match(normalized)
}

/// `$TICKER` is taken at face value; a bare uppercase symbol here only when
/// the tables know it. Unknown bare symbols are validated with a provider.
fn detect_symbol(raw: &str) -> Option<TickerMatch> {
    if let Some(symbol) = raw.strip_prefix('$') {
        let ticker = Ticker::parse(symbol).ok()?;
        let found = TickerMatch::new(ticker, 1.0, ResolutionMethod::Exact).ok()?;
        return Some(match tables::by_ticker(symbol) {
            Some(company) => found.with_company(company.name, Some(company.exchange.to_owned())),
            None => found,
        });
    }

    bare_symbol(raw)?;
    known_match(tables::by_ticker(raw)?, 1.0, ResolutionMethod::Exact)
}

/// Input written like a ticker: short, uppercase, optionally with `.` or `-`.
fn bare_symbol(raw: &str) -> Option<Ticker> {
    let looks_like_symbol = raw.len() <= MAX_SYMBOL_LEN
        && raw.chars().next().is_some_and(|ch| ch.is_ascii_uppercase())
        && raw
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch == '.' || ch == '-');
    if !looks_like_symbol {
        return None;
    }
    Ticker::parse(raw).ok()
}

fn fuzzy_match(normalized: &str) -> Option<TickerMatch> {
    let canonical = tables::CANONICAL
        .iter()
        .map(|(name, company)| (bigram_jaccard(normalized, name), FUZZY_CANONICAL_WEIGHT, *company));
    let aliases = tables::ALIASES.iter().filter_map(|(name, ticker)| {
        Some((
            bigram_jaccard(normalized, name),
            FUZZY_ALIAS_WEIGHT,
            *tables::by_ticker(ticker)?,
        ))
    });

    let (similarity, weight, company) = canonical
        .chain(aliases)
        .filter(|(similarity, weight, _)| {
            *similarity > FUZZY_SIMILARITY_FLOOR && similarity * weight >= MIN_CONFIDENCE
        })
        .max_by(|left, right| (left.0 * left.1).total_cmp(&(right.0 * right.1)))?;

    debug!(normalized, ticker = company.ticker, similarity, "fuzzy match");
    known_match(&company, similarity * weight, ResolutionMethod::Fuzzy)
}

fn known_match(company: &KnownCompany, confidence: f64, method: ResolutionMethod) -> Option<TickerMatch> {
    let ticker = Ticker::parse(company.ticker).ok()?;
    let found = TickerMatch::new(ticker, confidence, method).ok()?;
    Some(found.with_company(company.name, Some(company.exchange.to_owned())))
}

fn external_match(ticker: Ticker, name: String, exchange: Option<String>) -> Option<TickerMatch> {
    let found = TickerMatch::new(ticker, EXTERNAL_CONFIDENCE, ResolutionMethod::External).ok()?;
    Some(found.with_company(name, exchange))
}

/// The input itself spells the ticker ("ibm" for `IBM`).
fn symbol_matches(ticker: &Ticker, normalized: &str) -> bool {
    let compact = normalized.replace(' ', "");
    !compact.is_empty() && ticker.as_str().eq_ignore_ascii_case(&compact)
}

/// A provider's company name matches when its normalized form contains the
/// stripped input.
fn name_matches(provider_name: &str, stripped_input: &str) -> bool {
    !stripped_input.is_empty() && normalize(provider_name).contains(stripped_input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::executor::ExecutorSettings;
    use crate::guard::ProviderGuards;
    use crate::registry::SourceRegistry;

    fn offline_resolver() -> EntityResolver {
        let registry = Arc::new(SourceRegistry::default());
        let guards = ProviderGuards::for_providers(registry.providers(), &BTreeMap::new());
        let executor = QueryExecutor::new(
            registry,
            TieredCache::memory_only(),
            guards,
            ExecutorSettings::default(),
        );
        EntityResolver::new(executor, ResolverSettings::default())
    }

    #[test]
    fn normalize_keeps_ampersand_and_hyphen() {
        assert_eq!(normalize("  JPMorgan Chase & Co. "), "jpmorgan chase & co");
        assert_eq!(normalize("Coca-Cola, Inc"), "coca-cola inc");
    }

    #[tokio::test]
    async fn canonical_name_is_exact() {
        let found = offline_resolver()
            .resolve("Microsoft")
            .await
            .expect("valid input")
            .expect("resolved");

        assert_eq!(found.ticker.as_str(), "MSFT");
        assert_eq!(found.method, ResolutionMethod::Exact);
        assert_eq!(found.confidence, 1.0);
    }

    #[tokio::test]
    async fn cashtag_is_exact_even_when_unknown() {
        let found = offline_resolver()
            .resolve("$PLTR")
            .await
            .expect("valid input")
            .expect("resolved");

        assert_eq!(found.ticker.as_str(), "PLTR");
        assert_eq!(found.method, ResolutionMethod::Exact);
        assert!(found.company_name.is_none());
    }

    #[tokio::test]
    async fn unknown_bare_symbol_needs_a_provider() {
        let resolver = offline_resolver();

        let known = resolver.resolve("NVDA").await.expect("valid").expect("resolved");
        assert_eq!(known.ticker.as_str(), "NVDA");
        assert_eq!(resolver.resolve("QQQZ").await.expect("valid"), None);
    }

    #[tokio::test]
    async fn alias_resolves_at_alias_confidence() {
        let found = offline_resolver()
            .resolve("Facebook")
            .await
            .expect("valid input")
            .expect("resolved");

        assert_eq!(found.ticker.as_str(), "META");
        assert_eq!(found.method, ResolutionMethod::Alias);
        assert_eq!(found.confidence, ALIAS_CONFIDENCE);
    }

    #[tokio::test]
    async fn misspelling_resolves_fuzzily() {
        let found = offline_resolver()
            .resolve("Microsofft")
            .await
            .expect("valid input")
            .expect("resolved");

        assert_eq!(found.ticker.as_str(), "MSFT");
        assert_eq!(found.method, ResolutionMethod::Fuzzy);
        assert!(found.confidence >= MIN_CONFIDENCE && found.confidence < 0.9);
    }

    #[tokio::test]
    async fn blank_input_is_an_error() {
        assert_eq!(
            offline_resolver().resolve("  ...  ").await,
            Err(ResolveError::EmptyInput)
        );
    }

    #[tokio::test]
    async fn resolve_multiple_preserves_order() {
        let entities = vec![
            String::from("Tesla"),
            String::from(""),
            String::from("Google"),
            String::from("Zzyzx Widgets"),
        ];

        let resolved = offline_resolver().resolve_multiple(&entities).await;

        let tickers = resolved
            .iter()
            .map(|found| found.as_ref().map(|found| found.ticker.as_str().to_owned()))
            .collect::<Vec<_>>();
        assert_eq!(
            tickers,
            vec![
                Some(String::from("TSLA")),
                None,
                Some(String::from("GOOGL")),
                None
            ]
        );
    }
}
