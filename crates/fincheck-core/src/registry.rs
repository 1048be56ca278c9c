//! Catalog of data sources ranked per query kind.

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapters::{AlphaVantageAdapter, FredAdapter, PolygonAdapter, YahooAdapter};
use crate::data_source::{DataQuery, DataSource, QueryKind};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::ProviderId;

/// Priority given to sources registered without an explicit one.
pub const DEFAULT_PRIORITY: u32 = 100;

#[derive(Clone)]
struct Ranked {
    source: Arc<dyn DataSource>,
    priority: u32,
}

impl Ranked {
    fn rank_key(&self) -> (u32, crate::data_source::ReliabilityTier, &'static str) {
        let metadata = self.source.metadata();
        (self.priority, metadata.tier, metadata.provider.as_str())
    }
}

/// Read-only registry built once at startup and shared through `Arc`.
///
/// Sources are ranked by explicit priority (lower first), then reliability
/// tier, then provider name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    ranked: Vec<Ranked>,
    by_kind: BTreeMap<QueryKind, Vec<Arc<dyn DataSource>>>,
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::new()
    }

    /// Registry over `sources` with default priorities.
    pub fn from_sources(sources: impl IntoIterator<Item = Arc<dyn DataSource>>) -> Self {
        Self::ranked(
            sources
                .into_iter()
                .map(|source| (source, DEFAULT_PRIORITY))
                .collect(),
        )
    }

    fn ranked(sources: Vec<(Arc<dyn DataSource>, u32)>) -> Self {
        let mut unique: BTreeMap<ProviderId, Ranked> = BTreeMap::new();
        for (source, priority) in sources {
            unique.insert(source.id(), Ranked { source, priority });
        }

        let mut ranked = unique.into_values().collect::<Vec<_>>();
        ranked.sort_by(|left, right| left.rank_key().cmp(&right.rank_key()));

        let by_kind = QueryKind::ALL
            .into_iter()
            .map(|kind| {
                let chain = ranked
                    .iter()
                    .filter(|entry| entry.source.supports(kind))
                    .map(|entry| Arc::clone(&entry.source))
                    .collect::<Vec<_>>();
                (kind, chain)
            })
            .collect();

        Self { ranked, by_kind }
    }

    /// Top-ranked source able to answer `query`.
    pub fn best_source_for(&self, query: &DataQuery) -> Option<Arc<dyn DataSource>> {
        self.by_kind
            .get(&query.kind)
            .and_then(|chain| chain.first())
            .cloned()
    }

    /// Every source supporting `kind`, best first.
    pub fn sources_for(&self, kind: QueryKind) -> Vec<Arc<dyn DataSource>> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    pub fn supports_kind(&self, kind: QueryKind) -> bool {
        self.by_kind
            .get(&kind)
            .is_some_and(|chain| !chain.is_empty())
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn DataSource>> {
        self.ranked
            .iter()
            .find(|entry| entry.source.id() == provider)
            .map(|entry| Arc::clone(&entry.source))
    }

    /// Registered providers in rank order.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.ranked.iter().map(|entry| entry.source.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Builder for [`SourceRegistry`].
///
/// Yahoo needs no credentials and is registered unless disabled. Alpha
/// Vantage, Polygon and FRED are registered only when a key is configured.
///
/// ```rust,no_run
/// use fincheck_core::registry::SourceRegistry;
///
/// let registry = SourceRegistry::builder().with_env_keys().build();
/// println!("{:?}", registry.providers());
/// ```
pub struct SourceRegistryBuilder {
    http: Option<Arc<dyn HttpClient>>,
    keys: BTreeMap<ProviderId, String>,
    disabled: Vec<ProviderId>,
    priorities: BTreeMap<ProviderId, u32>,
    extra: Vec<Arc<dyn DataSource>>,
}

impl Default for SourceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        Self {
            http: None,
            keys: BTreeMap::new(),
            disabled: Vec::new(),
            priorities: BTreeMap::new(),
            extra: Vec::new(),
        }
    }

    /// Reads provider keys from `FINCHECK_<PROVIDER>_API_KEY`, falling back to
    /// `<PROVIDER>_API_KEY`. Keys already set explicitly are kept.
    pub fn with_env_keys(self) -> Self {
        self.with_key_lookup(|name| env::var(name).ok())
    }

    /// Like [`with_env_keys`](Self::with_env_keys) with a custom variable lookup.
    pub fn with_key_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for provider in ProviderId::ALL {
            let Some(names) = provider.api_key_env_vars() else {
                continue;
            };
            if self.keys.contains_key(&provider) {
                continue;
            }
            let key = names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_owned())
                .find(|value| !value.is_empty());
            if let Some(key) = key {
                self.keys.insert(provider, key);
            }
        }
        self
    }

    pub fn with_alphavantage_key(self, key: impl Into<String>) -> Self {
        self.with_key(ProviderId::AlphaVantage, key)
    }

    pub fn with_polygon_key(self, key: impl Into<String>) -> Self {
        self.with_key(ProviderId::Polygon, key)
    }

    pub fn with_fred_key(self, key: impl Into<String>) -> Self {
        self.with_key(ProviderId::Fred, key)
    }

    fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    pub fn with_provider_enabled(mut self, provider: ProviderId, enabled: bool) -> Self {
        self.disabled.retain(|disabled| *disabled != provider);
        if !enabled {
            self.disabled.push(provider);
        }
        self
    }

    /// Explicit rank for `provider`; lower values are tried first.
    pub fn with_priority(mut self, provider: ProviderId, priority: u32) -> Self {
        self.priorities.insert(provider, priority);
        self
    }

    /// Transport shared by the built-in adapters. Defaults to reqwest.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Registers a prebuilt source, replacing a built-in adapter with the same id.
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.extra.push(source);
        self
    }

    pub fn build(self) -> SourceRegistry {
        let http = self
            .http
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let enabled = |provider: ProviderId| !self.disabled.contains(&provider);

        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
        if enabled(ProviderId::Yahoo) {
            sources.push(Arc::new(YahooAdapter::new(Arc::clone(&http))));
        }
        for (provider, key) in &self.keys {
            if !enabled(*provider) {
                continue;
            }
            match provider {
                ProviderId::AlphaVantage => {
                    sources.push(Arc::new(AlphaVantageAdapter::new(Arc::clone(&http), key.clone())));
                }
                ProviderId::Polygon => {
                    sources.push(Arc::new(PolygonAdapter::new(Arc::clone(&http), key.clone())));
                }
                ProviderId::Fred => {
                    sources.push(Arc::new(FredAdapter::new(Arc::clone(&http), key.clone())));
                }
                ProviderId::Yahoo => {}
            }
        }
        for provider in ProviderId::ALL {
            if provider.api_key_env_vars().is_some() && !self.keys.contains_key(&provider) {
                debug!(%provider, "no API key configured; provider not registered");
            }
        }
        sources.extend(
            self.extra
                .iter()
                .filter(|source| enabled(source.id()))
                .cloned(),
        );

        let registry = SourceRegistry::ranked(
            sources
                .into_iter()
                .map(|source| {
                    let priority = self
                        .priorities
                        .get(&source.id())
                        .copied()
                        .unwrap_or(DEFAULT_PRIORITY);
                    (source, priority)
                })
                .collect(),
        );
        info!(providers = ?registry.providers(), "source registry built");
        registry
    }
}
