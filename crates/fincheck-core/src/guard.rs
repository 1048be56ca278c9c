//! Per-provider admission control: token bucket plus circuit breaker.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState, Transition};
use crate::data_source::{SourceError, SourceErrorKind};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::TokenBucket;
use crate::ProviderId;

/// Admission gate for one provider.
pub struct ProviderGuard {
    provider: ProviderId,
    bucket: TokenBucket,
    breaker: CircuitBreaker,
}

impl ProviderGuard {
    pub fn new(policy: &ProviderPolicy) -> Self {
        Self {
            provider: policy.provider_id,
            bucket: TokenBucket::new(policy.rate_limit),
            breaker: CircuitBreaker::new(policy.breaker),
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Admits one call or explains the denial. The breaker is consulted
    /// before the bucket so an open circuit never spends a token.
    pub fn admit(&self) -> Result<(), SourceError> {
        let (allowed, transition) = self.breaker.allow_request();
        self.log_transition(transition);
        if !allowed {
            return Err(SourceError::circuit_open(format!(
                "{} circuit breaker is open; skipping upstream call",
                self.provider
            ))
            .denied_by_guard());
        }

        self.bucket.try_acquire().map_err(|wait| {
            SourceError::rate_limited(format!(
                "{} rate limit of {}/min exhausted; retry in {:.2}s",
                self.provider,
                self.bucket.limit().requests_per_minute,
                wait.as_secs_f64()
            ))
            .denied_by_guard()
        })
    }

    pub fn record_success(&self) {
        let transition = self.breaker.record_success();
        self.log_transition(transition);
    }

    /// Feeds a failed call into the breaker. Failures that say nothing about
    /// provider health (not found, unsupported, bad request) are ignored.
    pub fn record_failure(&self, error: &SourceError) {
        if !counts_against_provider(error.kind()) {
            return;
        }
        let transition = self.breaker.record_failure();
        self.log_transition(transition);
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn is_open(&self) -> bool {
        self.circuit_state() == CircuitState::Open
    }

    fn log_transition(&self, transition: Transition) {
        match transition {
            Some((from, CircuitState::Open)) => {
                warn!(provider = %self.provider, %from, to = "open", "circuit breaker opened");
            }
            Some((from, to)) => {
                info!(provider = %self.provider, %from, %to, "circuit breaker transition");
            }
            None => {}
        }
    }
}

const fn counts_against_provider(kind: SourceErrorKind) -> bool {
    matches!(
        kind,
        SourceErrorKind::Unavailable
            | SourceErrorKind::RateLimited
            | SourceErrorKind::Timeout
            | SourceErrorKind::Parse
    )
}

/// One guard per provider.
#[derive(Clone, Default)]
pub struct ProviderGuards {
    guards: BTreeMap<ProviderId, Arc<ProviderGuard>>,
}

impl ProviderGuards {
    /// Guards for `providers`, using `overrides` where present and the
    /// provider default otherwise.
    pub fn for_providers(
        providers: impl IntoIterator<Item = ProviderId>,
        overrides: &BTreeMap<ProviderId, ProviderPolicy>,
    ) -> Self {
        let guards = providers
            .into_iter()
            .map(|provider| {
                let policy = overrides
                    .get(&provider)
                    .cloned()
                    .unwrap_or_else(|| ProviderPolicy::default_for(provider));
                (provider, Arc::new(ProviderGuard::new(&policy)))
            })
            .collect();
        Self { guards }
    }

    pub fn get(&self, provider: ProviderId) -> Option<&Arc<ProviderGuard>> {
        self.guards.get(&provider)
    }

    pub fn is_open(&self, provider: ProviderId) -> bool {
        self.get(provider).is_some_and(|guard| guard.is_open())
    }
}
