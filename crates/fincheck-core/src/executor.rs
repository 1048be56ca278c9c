//! Multi-source query execution.
//!
//! Every adapter call follows the same sequence: cache lookup, guard
//! admission, a global concurrency permit, then the adapter call under a
//! timeout. Successful payloads are written back through the cache.
//!
//! | Mode | Order | Stops at |
//! |------|-------|----------|
//! | [`execute_fallback`](QueryExecutor::execute_fallback) | strict rank order, sequential | first success |
//! | [`execute_cross`](QueryExecutor::execute_cross) | top ranked sources, concurrent | all finished |

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::{response_key, TieredCache};
use crate::data_source::{DataPayload, DataQuery, DataResponse, DataSource, QueryKind, SourceError};
use crate::guard::ProviderGuards;
use crate::registry::SourceRegistry;
use crate::ProviderId;

/// Limits and TTLs applied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub max_concurrent_calls: usize,
    pub call_timeout: Duration,
    /// TTL for prices and market caps.
    pub live_ttl: Duration,
    /// TTL for profiles, search results, revenue and indicator series.
    pub derived_ttl: Duration,
    /// How many ranked sources cross-verification queries.
    pub cross_verify_width: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 10,
            call_timeout: Duration::from_secs(15),
            live_ttl: Duration::from_secs(300),
            derived_ttl: Duration::from_secs(86_400),
            cross_verify_width: 3,
        }
    }
}

impl ExecutorSettings {
    pub fn ttl_for(&self, kind: QueryKind) -> Duration {
        if kind.is_live_market_data() {
            self.live_ttl
        } else {
            self.derived_ttl
        }
    }
}

/// Counters for one verification run (or the process, if never scoped).
#[derive(Debug, Default)]
pub struct ExecutionStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    guard_denials: AtomicU64,
    provider_calls: AtomicU64,
    consulted: Mutex<BTreeSet<ProviderId>>,
    denied: Mutex<BTreeSet<ProviderId>>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_cache_hit(&self, provider: ProviderId) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.mark_consulted(provider);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_call(&self, provider: ProviderId) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        self.mark_consulted(provider);
    }

    fn record_denial(&self, provider: ProviderId) {
        self.guard_denials.fetch_add(1, Ordering::Relaxed);
        self.denied
            .lock()
            .expect("denied provider set is not poisoned")
            .insert(provider);
    }

    fn mark_consulted(&self, provider: ProviderId) {
        self.consulted
            .lock()
            .expect("consulted provider set is not poisoned")
            .insert(provider);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            guard_denials: self.guard_denials.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            providers_consulted: self
                .consulted
                .lock()
                .expect("consulted provider set is not poisoned")
                .iter()
                .copied()
                .collect(),
            providers_denied: self
                .denied
                .lock()
                .expect("denied provider set is not poisoned")
                .iter()
                .copied()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub guard_denials: u64,
    pub provider_calls: u64,
    pub providers_consulted: Vec<ProviderId>,
    pub providers_denied: Vec<ProviderId>,
}

/// Successful fallback execution.
#[derive(Debug, Clone)]
pub struct SourcedResponse {
    pub response: DataResponse,
    /// Providers tried, in order, ending with the one that answered.
    pub chain: Vec<ProviderId>,
    pub failures: Vec<(ProviderId, SourceError)>,
}

/// Every ranked source failed or was denied.
#[derive(Debug, Clone)]
pub struct ChainExhausted {
    pub kind: QueryKind,
    pub chain: Vec<ProviderId>,
    pub errors: Vec<(ProviderId, SourceError)>,
}

impl ChainExhausted {
    /// `yahoo -> polygon`, or `none` when no source supports the kind.
    pub fn chain_label(&self) -> String {
        if self.chain.is_empty() {
            return String::from("none");
        }
        self.chain
            .iter()
            .map(|provider| provider.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl Display for ChainExhausted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "all sources exhausted for {} (chain: {})",
            self.kind,
            self.chain_label()
        )?;
        for (provider, error) in &self.errors {
            write!(f, "; {provider}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ChainExhausted {}

/// Outcome of querying several sources concurrently.
#[derive(Debug, Clone, Default)]
pub struct CrossVerification {
    pub responses: Vec<DataResponse>,
    pub failures: Vec<(ProviderId, SourceError)>,
    pub queried: Vec<ProviderId>,
}

impl CrossVerification {
    /// Share of queried sources that answered.
    pub fn coverage(&self) -> f64 {
        if self.queried.is_empty() {
            return 0.0;
        }
        self.responses.len() as f64 / self.queried.len() as f64
    }
}

/// Executes provider queries with caching, admission control and fallback.
///
/// Clones share the registry, cache, guards, semaphore and stats.
#[derive(Clone)]
pub struct QueryExecutor {
    registry: Arc<SourceRegistry>,
    cache: TieredCache,
    guards: ProviderGuards,
    semaphore: Arc<Semaphore>,
    settings: ExecutorSettings,
    stats: Arc<ExecutionStats>,
}

impl QueryExecutor {
    pub fn new(
        registry: Arc<SourceRegistry>,
        cache: TieredCache,
        guards: ProviderGuards,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            guards,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_calls.max(1))),
            settings,
            stats: Arc::new(ExecutionStats::new()),
        }
    }

    /// Same executor recording into `stats`.
    pub fn with_stats(&self, stats: Arc<ExecutionStats>) -> Self {
        Self {
            stats,
            ..self.clone()
        }
    }

    pub fn stats(&self) -> &Arc<ExecutionStats> {
        &self.stats
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn guards(&self) -> &ProviderGuards {
        &self.guards
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Stops handing out call permits; later live calls fail as unavailable.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Tries ranked sources one at a time until one answers.
    pub async fn execute_fallback(&self, query: &DataQuery) -> Result<SourcedResponse, ChainExhausted> {
        let mut chain = Vec::new();
        let mut failures: Vec<(ProviderId, SourceError)> = Vec::new();

        for source in self.registry.sources_for(query.kind) {
            let provider = source.id();
            chain.push(provider);

            match self.call_source(&source, query).await {
                Ok(mut response) => {
                    if let Some((first_failed, _)) = failures.first() {
                        response.is_fallback = true;
                        response.primary_source_failed = Some(*first_failed);
                        info!(
                            kind = %query.kind,
                            %provider,
                            primary = %first_failed,
                            failed = failures.len(),
                            "fallback source answered"
                        );
                    }
                    return Ok(SourcedResponse {
                        response,
                        chain,
                        failures,
                    });
                }
                Err(error) => failures.push((provider, error)),
            }
        }

        warn!(kind = %query.kind, chain = ?chain, "all sources exhausted");
        Err(ChainExhausted {
            kind: query.kind,
            chain,
            errors: failures,
        })
    }

    /// Queries the top ranked sources concurrently and keeps every answer.
    pub async fn execute_cross(&self, query: &DataQuery) -> CrossVerification {
        let sources = self
            .registry
            .sources_for(query.kind)
            .into_iter()
            .take(self.settings.cross_verify_width.max(1))
            .collect::<Vec<_>>();
        let queried = sources.iter().map(|source| source.id()).collect::<Vec<_>>();

        let outcomes = join_all(sources.iter().map(|source| async move {
            (source.id(), self.call_source(source, query).await)
        }))
        .await;

        let mut verification = CrossVerification {
            queried,
            ..CrossVerification::default()
        };
        for (provider, outcome) in outcomes {
            match outcome {
                Ok(response) => verification.responses.push(response),
                Err(error) => verification.failures.push((provider, error)),
            }
        }
        debug!(
            kind = %query.kind,
            answered = verification.responses.len(),
            queried = verification.queried.len(),
            "cross verification finished"
        );
        verification
    }

    async fn call_source(
        &self,
        source: &Arc<dyn DataSource>,
        query: &DataQuery,
    ) -> Result<DataResponse, SourceError> {
        let provider = source.id();
        if !source.supports(query.kind) {
            return Err(SourceError::unsupported(query.kind, provider));
        }

        let key = response_key(provider, query.kind, &query.normalized_params());
        if let Some(payload) = self.cache.get_json::<DataPayload>(&key).await {
            debug!(%provider, kind = %query.kind, "cache hit");
            self.stats.record_cache_hit(provider);
            let mut response = DataResponse::success(
                provider,
                query.kind,
                payload,
                source.metadata().tier.base_confidence(),
                0,
            );
            response.from_cache = true;
            return Ok(response);
        }
        debug!(%provider, kind = %query.kind, "cache miss");
        self.stats.record_cache_miss();

        let guard = self.guards.get(provider);
        if let Some(guard) = guard {
            if let Err(denial) = guard.admit() {
                warn!(%provider, code = denial.code(), "call denied by provider guard");
                self.stats.record_denial(provider);
                return Err(denial);
            }
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SourceError::unavailable("query executor is shut down"))?;
        self.stats.record_call(provider);

        let started = Instant::now();
        let response = match tokio::time::timeout(self.settings.call_timeout, source.query(query)).await {
            Ok(response) => response,
            Err(_) => DataResponse::failure(
                provider,
                query.kind,
                SourceError::timeout(format!(
                    "{provider} did not answer within {}ms",
                    self.settings.call_timeout.as_millis()
                )),
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ),
        };

        let outcome = match (&response.error, &response.payload) {
            (None, Some(payload)) => {
                let ttl = self.settings.ttl_for(query.kind);
                if let Err(error) = self.cache.put_json(&key, payload, ttl).await {
                    warn!(%provider, %error, "failed to cache provider payload");
                }
                Ok(response)
            }
            (Some(error), _) => Err(error.clone()),
            (None, None) => Err(SourceError::parse(format!(
                "{provider} returned neither payload nor error"
            ))),
        };

        if let Some(guard) = guard {
            match &outcome {
                Ok(_) => guard.record_success(),
                Err(error) => guard.record_failure(error),
            }
        }
        if let Err(error) = &outcome {
            warn!(%provider, kind = %query.kind, code = error.code(), error = error.message(), "provider call failed");
        }
        outcome
    }
}
