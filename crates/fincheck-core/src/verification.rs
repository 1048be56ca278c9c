//! Claim scoring.
//!
//! Company metrics (price, market cap, revenue) are resolved to a ticker and
//! compared against provider data; macro indicators are compared when a
//! source for them is registered; everything else gets a plausibility check.

use tracing::{debug, info};

use crate::data_source::{DataPayload, DataQuery, QueryKind};
use crate::executor::{ChainExhausted, CrossVerification, QueryExecutor, SourcedResponse};
use crate::resolver::EntityResolver;
use crate::{
    CheckFailure, ClaimKind, FactCheckResult, FinancialClaim, ProviderId, TickerMatch, ValueUnit,
    VerificationStatus,
};

const MAX_CONFIDENCE: f64 = 0.95;
const MIN_COMPARED_CONFIDENCE: f64 = 0.1;
const NON_FACTUAL_CONFIDENCE: f64 = 0.2;
const UNCHECKABLE_CONFIDENCE: f64 = 0.1;
const EXHAUSTED_CONFIDENCE: f64 = 0.05;
const PLAUSIBLE_CONFIDENCE: f64 = 0.65;
const IMPLAUSIBLE_CONFIDENCE: f64 = 0.2;
const DISAGREEMENT_PENALTY: f64 = 0.8;

/// Discrepancy thresholds and cross-verification cut-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationSettings {
    pub price_threshold: f64,
    pub market_cap_threshold: f64,
    pub revenue_threshold: f64,
    pub indicator_threshold: f64,
    /// Market cap claims at or above this absolute value are cross-verified.
    pub cross_verify_market_cap: f64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            price_threshold: 0.05,
            market_cap_threshold: 0.10,
            revenue_threshold: 0.10,
            indicator_threshold: 0.10,
            cross_verify_market_cap: 1e11,
        }
    }
}

/// Relative distance of `claimed` from `actual`.
///
/// A zero actual value only agrees with a zero claim.
pub fn relative_discrepancy(claimed: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return if claimed == 0.0 { 0.0 } else { 1.0 };
    }
    (actual - claimed).abs() / actual.abs()
}

/// Confidence of a compared claim: `0.95 - discrepancy` clamped to [0.1, 0.95].
pub fn comparison_confidence(discrepancy: f64) -> f64 {
    (MAX_CONFIDENCE - discrepancy).clamp(MIN_COMPARED_CONFIDENCE, MAX_CONFIDENCE)
}

/// Scores claims against provider data.
#[derive(Clone)]
pub struct VerificationEngine {
    executor: QueryExecutor,
    resolver: EntityResolver,
    settings: VerificationSettings,
}

impl VerificationEngine {
    pub fn new(executor: QueryExecutor, resolver: EntityResolver, settings: VerificationSettings) -> Self {
        Self {
            executor,
            resolver,
            settings,
        }
    }

    /// Same engine with provider traffic routed through `executor`.
    pub fn with_executor(&self, executor: QueryExecutor) -> Self {
        Self {
            resolver: self.resolver.with_executor(executor.clone()),
            executor,
            settings: self.settings,
        }
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    /// Verdict for one claim. Never fails; problems are reported in the result.
    pub async fn verify_claim(&self, claim: &FinancialClaim) -> FactCheckResult {
        let result = match claim.kind {
            ClaimKind::Opinion | ClaimKind::Prediction => non_factual(claim),
            ClaimKind::Price => {
                self.verify_company_metric(claim, QueryKind::Price, self.settings.price_threshold)
                    .await
            }
            ClaimKind::MarketCap => {
                self.verify_company_metric(claim, QueryKind::MarketCap, self.settings.market_cap_threshold)
                    .await
            }
            ClaimKind::Revenue => {
                if self.executor.registry().supports_kind(QueryKind::Revenue) {
                    self.verify_company_metric(claim, QueryKind::Revenue, self.settings.revenue_threshold)
                        .await
                } else {
                    plausibility(claim, &REVENUE_RANGE)
                }
            }
            ClaimKind::InterestRate => self.verify_indicator(claim, QueryKind::InterestRate, &RATE_RANGE).await,
            ClaimKind::Inflation => self.verify_indicator(claim, QueryKind::Inflation, &INFLATION_RANGE).await,
            ClaimKind::GrowthRate => plausibility(claim, &GROWTH_RANGE),
        };

        info!(
            kind = %claim.kind,
            status = %result.status,
            confidence = result.confidence,
            sources = result.sources.len(),
            "claim verified"
        );
        result
    }

    async fn verify_company_metric(&self, claim: &FinancialClaim, kind: QueryKind, threshold: f64) -> FactCheckResult {
        let Some(entity) = claim.primary_entity() else {
            return ambiguous(claim, "the claim names no company");
        };
        let Some(value) = claim.primary_value() else {
            return ambiguous(claim, "the claim carries no numeric value");
        };
        let claimed = value.absolute();

        let found = match self.resolver.resolve(entity).await {
            Ok(Some(found)) => found,
            Ok(None) | Err(_) => {
                return FactCheckResult::new(
                    claim.clone(),
                    VerificationStatus::Inconclusive,
                    UNCHECKABLE_CONFIDENCE,
                    format!("Could not resolve '{entity}' to a ticker symbol."),
                )
                .with_failure(CheckFailure::NoMatchFound);
            }
        };

        let ticker = found.ticker.clone();
        let query = match kind {
            QueryKind::MarketCap => DataQuery::market_cap(ticker),
            QueryKind::Revenue => DataQuery::revenue(ticker),
            _ => DataQuery::price(ticker),
        };

        if kind == QueryKind::MarketCap && claimed >= self.settings.cross_verify_market_cap {
            let cross = self.executor.execute_cross(&query).await;
            if !cross.responses.is_empty() {
                return cross_verified(claim, claimed, threshold, cross).with_ticker(Some(found));
            }
            debug!(ticker = %found.ticker, "cross verification got no answers, falling back");
        }

        match self.executor.execute_fallback(&query).await {
            Ok(sourced) => compared(claim, claimed, threshold, sourced, Some(found)),
            Err(exhausted) => exhausted_result(claim, &exhausted).with_ticker(Some(found)),
        }
    }

    async fn verify_indicator(&self, claim: &FinancialClaim, kind: QueryKind, range: &PlausibleRange) -> FactCheckResult {
        if !self.executor.registry().supports_kind(kind) {
            return plausibility(claim, range);
        }
        let Some(value) = claim.primary_value() else {
            return ambiguous(claim, "the claim carries no numeric value");
        };
        let claimed = value.absolute();
        let query = if kind == QueryKind::Inflation {
            DataQuery::inflation()
        } else {
            DataQuery::interest_rate()
        };

        match self.executor.execute_fallback(&query).await {
            Ok(sourced) => compared(claim, claimed, self.settings.indicator_threshold, sourced, None),
            Err(exhausted) => exhausted_result(claim, &exhausted),
        }
    }
}

fn non_factual(claim: &FinancialClaim) -> FactCheckResult {
    FactCheckResult::new(
        claim.clone(),
        VerificationStatus::Inconclusive,
        NON_FACTUAL_CONFIDENCE,
        format!(
            "{} claims are non-factual by nature and cannot be checked against market data.",
            capitalized(claim.kind.as_str())
        ),
    )
}

fn ambiguous(claim: &FinancialClaim, reason: &str) -> FactCheckResult {
    FactCheckResult::new(
        claim.clone(),
        VerificationStatus::Inconclusive,
        UNCHECKABLE_CONFIDENCE,
        format!("Cannot verify: {reason}."),
    )
    .with_failure(CheckFailure::AmbiguousClaim)
}

fn exhausted_result(claim: &FinancialClaim, exhausted: &ChainExhausted) -> FactCheckResult {
    FactCheckResult::new(
        claim.clone(),
        VerificationStatus::Unverified,
        EXHAUSTED_CONFIDENCE,
        format!(
            "No data available: all sources exhausted for {} (chain: {}).",
            exhausted.kind,
            exhausted.chain_label()
        ),
    )
    .with_sources(exhausted.chain.clone())
    .with_failure(CheckFailure::AllSourcesExhausted)
    .with_warnings(failure_warnings(&exhausted.errors))
}

fn compared(
    claim: &FinancialClaim,
    claimed: f64,
    threshold: f64,
    sourced: SourcedResponse,
    found: Option<TickerMatch>,
) -> FactCheckResult {
    let response = &sourced.response;
    let Some(actual) = response.value() else {
        let exhausted = ChainExhausted {
            kind: response.kind,
            chain: sourced.chain.clone(),
            errors: sourced.failures.clone(),
        };
        return exhausted_result(claim, &exhausted).with_ticker(found);
    };

    let discrepancy = relative_discrepancy(claimed, actual);
    let status = status_for(discrepancy, threshold);
    let mut warnings = failure_warnings(&sourced.failures);
    if let Some(warning) = currency_warning(claim, response.payload.as_ref()) {
        warnings.push(warning);
    }

    FactCheckResult::new(
        claim.clone(),
        status,
        comparison_confidence(discrepancy),
        comparison_explanation(claim.kind, claimed, actual, &[response.provider], discrepancy, threshold),
    )
    .with_comparison(actual, discrepancy)
    .with_sources(sourced.chain)
    .with_ticker(found)
    .with_warnings(warnings)
}

fn cross_verified(claim: &FinancialClaim, claimed: f64, threshold: f64, cross: CrossVerification) -> FactCheckResult {
    let answers = cross
        .responses
        .iter()
        .filter_map(|response| response.value().map(|value| (response.provider, value)))
        .collect::<Vec<_>>();
    let mut values = answers.iter().map(|(_, value)| *value).collect::<Vec<_>>();
    let Some(reference) = median(&mut values) else {
        let exhausted = ChainExhausted {
            kind: QueryKind::MarketCap,
            chain: cross.queried.clone(),
            errors: cross.failures.clone(),
        };
        return exhausted_result(claim, &exhausted);
    };

    let discrepancy = relative_discrepancy(claimed, reference);
    let mut confidence = comparison_confidence(discrepancy);
    let mut warnings = failure_warnings(&cross.failures);

    let coverage = answers.len() as f64 / cross.queried.len().max(1) as f64;
    if coverage < 1.0 {
        confidence *= coverage;
    }
    let disagreeing = answers
        .iter()
        .filter(|(_, value)| relative_discrepancy(*value, reference) > threshold)
        .map(|(provider, _)| *provider)
        .collect::<Vec<_>>();
    if !disagreeing.is_empty() {
        confidence *= DISAGREEMENT_PENALTY;
        warnings.push(format!(
            "providers disagree on market cap: {} deviate more than {} from the median",
            provider_list(&disagreeing),
            percent(threshold)
        ));
    }

    let providers = answers.iter().map(|(provider, _)| *provider).collect::<Vec<_>>();
    let sources = cross
        .queried
        .iter()
        .copied()
        .filter(|provider| providers.contains(provider))
        .collect::<Vec<_>>();

    FactCheckResult::new(
        claim.clone(),
        status_for(discrepancy, threshold),
        confidence,
        comparison_explanation(claim.kind, claimed, reference, &sources, discrepancy, threshold),
    )
    .with_comparison(reference, discrepancy)
    .with_sources(sources)
    .with_warnings(warnings)
}

fn status_for(discrepancy: f64, threshold: f64) -> VerificationStatus {
    if discrepancy < threshold {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Unverified
    }
}

struct PlausibleRange {
    label: &'static str,
    min: f64,
    max: f64,
    /// Both bounds excluded instead of included.
    exclusive: bool,
    unit: &'static str,
}

impl PlausibleRange {
    fn contains(&self, value: f64) -> bool {
        if self.exclusive {
            value > self.min && value < self.max
        } else {
            (self.min..=self.max).contains(&value)
        }
    }

    fn describe(&self) -> String {
        let (open, close) = if self.exclusive { ("(", ")") } else { ("[", "]") };
        format!(
            "{open}{}{unit}, {}{unit}{close}",
            format_amount(self.min),
            format_amount(self.max),
            unit = self.unit
        )
    }
}

const GROWTH_RANGE: PlausibleRange = PlausibleRange {
    label: "growth rate",
    min: -100.0,
    max: 1000.0,
    exclusive: false,
    unit: "%",
};

const RATE_RANGE: PlausibleRange = PlausibleRange {
    label: "interest rate",
    min: 0.0,
    max: 20.0,
    exclusive: false,
    unit: "%",
};

const INFLATION_RANGE: PlausibleRange = PlausibleRange {
    label: "inflation",
    min: 0.0,
    max: 10.0,
    exclusive: false,
    unit: "%",
};

const REVENUE_RANGE: PlausibleRange = PlausibleRange {
    label: "revenue",
    min: 0.0,
    max: 1e13,
    exclusive: true,
    unit: "",
};

fn plausibility(claim: &FinancialClaim, range: &PlausibleRange) -> FactCheckResult {
    let Some(value) = claim.primary_value() else {
        return ambiguous(claim, "the claim carries no numeric value");
    };
    let claimed = value.absolute();

    if range.contains(claimed) {
        FactCheckResult::new(
            claim.clone(),
            VerificationStatus::Inconclusive,
            PLAUSIBLE_CONFIDENCE,
            format!(
                "Claimed {} of {} is within the plausible range {}; no live source was compared.",
                range.label,
                format_amount(claimed),
                range.describe()
            ),
        )
    } else {
        FactCheckResult::new(
            claim.clone(),
            VerificationStatus::Unverified,
            IMPLAUSIBLE_CONFIDENCE,
            format!(
                "Claimed {} of {} is outside the plausible range {}.",
                range.label,
                format_amount(claimed),
                range.describe()
            ),
        )
    }
}

fn comparison_explanation(
    kind: ClaimKind,
    claimed: f64,
    actual: f64,
    providers: &[ProviderId],
    discrepancy: f64,
    threshold: f64,
) -> String {
    let verdict = if discrepancy < threshold {
        "within"
    } else {
        "exceeds"
    };
    let reference = if providers.len() > 1 {
        "median of"
    } else {
        "reported by"
    };
    format!(
        "Claimed {} {} vs actual {} ({reference} {}): {} discrepancy {verdict} the {} threshold.",
        kind.as_str().replace('_', " "),
        format_amount(claimed),
        format_amount(actual),
        provider_list(providers),
        percent(discrepancy),
        percent(threshold)
    )
}

fn currency_warning(claim: &FinancialClaim, payload: Option<&DataPayload>) -> Option<String> {
    let Some(ValueUnit::Currency(claimed)) = claim.primary_value().and_then(|value| value.unit.as_ref()) else {
        return None;
    };
    let reported = match payload? {
        DataPayload::Quote { currency, .. }
        | DataPayload::MarketCap { currency, .. }
        | DataPayload::Revenue { currency, .. } => currency,
        _ => return None,
    };
    (!claimed.eq_ignore_ascii_case(reported))
        .then(|| format!("claimed currency {claimed} differs from reported currency {reported}"))
}

fn failure_warnings(failures: &[(ProviderId, crate::data_source::SourceError)]) -> Vec<String> {
    failures
        .iter()
        .map(|(provider, error)| {
            format!("{} ({provider}): {error}", CheckFailure::ProviderUnavailable.as_str())
        })
        .collect()
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[middle - 1] + values[middle]) / 2.0)
    } else {
        Some(values[middle])
    }
}

fn provider_list(providers: &[ProviderId]) -> String {
    providers
        .iter()
        .map(|provider| provider.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

fn format_amount(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if magnitude >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        format!("{value:.2}")
    }
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
