//! Process-scoped fact-checking service.
//!
//! [`FactChecker`] owns the registry, tiered cache, provider guards and call
//! semaphore. Build one per process and share it; each [`FactChecker::verify`]
//! call records its own cache and provider statistics into the report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use fincheck_store::BlobStore;
use futures::future::join_all;
use tracing::{info, warn};

use crate::cache::{DurableStore, TieredCache};
use crate::config::FactCheckConfig;
use crate::executor::{ExecutionStats, QueryExecutor};
use crate::guard::ProviderGuards;
use crate::provider_policy::ProviderPolicy;
use crate::registry::SourceRegistry;
use crate::report::{ReportMeta, VerificationReport};
use crate::resolver::EntityResolver;
use crate::verification::VerificationEngine;
use crate::{FinancialClaim, ProviderId, ResolveError, TickerMatch};

enum DurableChoice {
    FromConfig,
    Custom(Arc<dyn DurableStore>),
    Disabled,
}

/// Builder for [`FactChecker`].
pub struct FactCheckerBuilder {
    config: FactCheckConfig,
    registry: Option<SourceRegistry>,
    durable: DurableChoice,
    policies: BTreeMap<ProviderId, ProviderPolicy>,
}

impl Default for FactCheckerBuilder {
    fn default() -> Self {
        Self {
            config: FactCheckConfig::default(),
            registry: None,
            durable: DurableChoice::FromConfig,
            policies: BTreeMap::new(),
        }
    }
}

impl FactCheckerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: FactCheckConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `registry` instead of one built from environment API keys.
    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = DurableChoice::Custom(store);
        self
    }

    /// Keeps the cache in process memory only.
    pub fn without_durable_store(mut self) -> Self {
        self.durable = DurableChoice::Disabled;
        self
    }

    /// Overrides the default rate limit and breaker policy of one provider.
    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policies.insert(policy.provider_id, policy);
        self
    }

    /// Builds the service. A durable store that fails to open is logged and
    /// the cache runs in memory only.
    pub fn build(self) -> FactChecker {
        let registry = Arc::new(
            self.registry
                .unwrap_or_else(|| SourceRegistry::builder().with_env_keys().build()),
        );

        let durable: Option<Arc<dyn DurableStore>> = match self.durable {
            DurableChoice::Custom(store) => Some(store),
            DurableChoice::Disabled => None,
            DurableChoice::FromConfig => match BlobStore::open(self.config.store_config()) {
                Ok(store) => Some(Arc::new(store)),
                Err(error) => {
                    warn!(%error, "durable cache unavailable; running memory only");
                    None
                }
            },
        };
        let cache = TieredCache::new(durable);

        let guards = ProviderGuards::for_providers(registry.providers(), &self.policies);
        let executor = QueryExecutor::new(registry, cache, guards, self.config.executor_settings());
        let resolver = EntityResolver::new(executor.clone(), self.config.resolver_settings());
        let engine = VerificationEngine::new(
            executor.clone(),
            resolver.clone(),
            self.config.verification_settings(),
        );

        info!(
            providers = ?executor.registry().providers(),
            durable = executor.cache().has_durable_tier(),
            "fact checker ready"
        );
        FactChecker {
            config: self.config,
            executor,
            resolver,
            engine,
        }
    }
}

/// Verifies financial claims against live provider data.
pub struct FactChecker {
    config: FactCheckConfig,
    executor: QueryExecutor,
    resolver: EntityResolver,
    engine: VerificationEngine,
}

impl FactChecker {
    pub fn builder() -> FactCheckerBuilder {
        FactCheckerBuilder::new()
    }

    /// Service configured from `FINCHECK_*` variables and provider keys in the environment.
    pub fn from_env() -> Result<Self, crate::ConfigError> {
        Ok(Self::builder().with_config(FactCheckConfig::from_env()?).build())
    }

    pub fn config(&self) -> &FactCheckConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        self.executor.registry()
    }

    pub fn cache(&self) -> &TieredCache {
        self.executor.cache()
    }

    pub fn guards(&self) -> &ProviderGuards {
        self.executor.guards()
    }

    /// Verifies every claim concurrently. Results keep the input order.
    pub async fn verify(&self, claims: &[FinancialClaim]) -> VerificationReport {
        let started = Instant::now();
        let stats = Arc::new(ExecutionStats::new());
        let engine = self
            .engine
            .with_executor(self.executor.with_stats(Arc::clone(&stats)));

        let results = join_all(claims.iter().map(|claim| engine.verify_claim(claim))).await;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = VerificationReport::new(ReportMeta::new(stats.snapshot(), latency_ms), results);
        info!(
            request_id = %report.meta.request_id,
            claims = claims.len(),
            cache_hits = report.meta.cache_hits,
            provider_calls = report.meta.provider_calls,
            latency_ms,
            "verification run finished"
        );
        report
    }

    pub async fn resolve_entity(&self, entity: &str) -> Result<Option<TickerMatch>, ResolveError> {
        self.resolver.resolve(entity).await
    }

    /// Resolves concurrently with bounded parallelism, in input order.
    pub async fn resolve_entities(&self, entities: &[String]) -> Vec<Option<TickerMatch>> {
        self.resolver.resolve_multiple(entities).await
    }

    /// Per provider: adapter health check passed and its breaker is not open.
    ///
    /// Adapters report the outcome of their most recent upstream exchange and
    /// never spend quota on a dedicated ping. A provider that has not been
    /// called yet therefore reads as healthy; the first failed call flips it.
    pub async fn health(&self) -> BTreeMap<ProviderId, bool> {
        let registry = self.executor.registry();
        let sources = registry
            .providers()
            .into_iter()
            .filter_map(|provider| registry.get(provider))
            .collect::<Vec<_>>();
        let checks = join_all(sources.iter().map(|source| async move {
            let provider = source.id();
            let healthy = !self.executor.guards().is_open(provider) && source.health_check().await;
            (provider, healthy)
        }))
        .await;
        checks.into_iter().collect()
    }

    /// Purges expired cache entries and stops issuing provider calls.
    pub async fn shutdown(self) {
        let removed = self.executor.cache().clear_expired().await;
        self.executor.close();
        info!(removed, "fact checker shut down");
    }
}
