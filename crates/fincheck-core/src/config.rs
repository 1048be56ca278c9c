use std::path::PathBuf;
use std::time::Duration;

use fincheck_store::StoreConfig;

use crate::executor::ExecutorSettings;
use crate::resolver::ResolverSettings;
use crate::verification::VerificationSettings;
use crate::ConfigError;

const MIN_CALL_TIMEOUT_SECS: u64 = 10;
const MAX_CALL_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for a [`FactChecker`](crate::service::FactChecker).
///
/// | Variable | Default |
/// |----------|---------|
/// | `FINCHECK_HOME` | `~/.fincheck` |
/// | `FINCHECK_MAX_CONCURRENT_CALLS` | 10 |
/// | `FINCHECK_CALL_TIMEOUT_SECS` | 15, clamped to 10..=30 |
/// | `FINCHECK_LIVE_TTL_SECS` | 300 |
/// | `FINCHECK_DERIVED_TTL_SECS` | 86400 |
/// | `FINCHECK_CROSS_VERIFY_MARKET_CAP` | 1e11 |
///
/// Provider API keys are read by
/// [`SourceRegistryBuilder::with_env_keys`](crate::registry::SourceRegistryBuilder::with_env_keys).
#[derive(Debug, Clone, PartialEq)]
pub struct FactCheckConfig {
    /// Durable store root; `None` resolves `FINCHECK_HOME` then `~/.fincheck`.
    pub fincheck_home: Option<PathBuf>,
    pub max_concurrent_calls: usize,
    pub call_timeout: Duration,
    pub live_ttl: Duration,
    pub derived_ttl: Duration,
    pub cross_verify_market_cap: f64,
    pub resolver_concurrency: usize,
}

impl Default for FactCheckConfig {
    fn default() -> Self {
        let executor = ExecutorSettings::default();
        Self {
            fincheck_home: None,
            max_concurrent_calls: executor.max_concurrent_calls,
            call_timeout: executor.call_timeout,
            live_ttl: executor.live_ttl,
            derived_ttl: executor.derived_ttl,
            cross_verify_market_cap: VerificationSettings::default().cross_verify_market_cap,
            resolver_concurrency: ResolverSettings::default().concurrency,
        }
    }
}

impl FactCheckConfig {
    /// Defaults overlaid with `FINCHECK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`. Blank values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(home) = read("FINCHECK_HOME") {
            config.fincheck_home = Some(PathBuf::from(home));
        }
        if let Some(raw) = read("FINCHECK_MAX_CONCURRENT_CALLS") {
            config.max_concurrent_calls = parse_positive("FINCHECK_MAX_CONCURRENT_CALLS", &raw)?;
        }
        if let Some(raw) = read("FINCHECK_CALL_TIMEOUT_SECS") {
            let secs = parse_positive::<u64>("FINCHECK_CALL_TIMEOUT_SECS", &raw)?;
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = read("FINCHECK_LIVE_TTL_SECS") {
            config.live_ttl = Duration::from_secs(parse_positive("FINCHECK_LIVE_TTL_SECS", &raw)?);
        }
        if let Some(raw) = read("FINCHECK_DERIVED_TTL_SECS") {
            config.derived_ttl = Duration::from_secs(parse_positive("FINCHECK_DERIVED_TTL_SECS", &raw)?);
        }
        if let Some(raw) = read("FINCHECK_CROSS_VERIFY_MARKET_CAP") {
            config.cross_verify_market_cap = raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value > 0.0)
                .ok_or(ConfigError::InvalidValue {
                    name: "FINCHECK_CROSS_VERIFY_MARKET_CAP",
                    value: raw.clone(),
                    reason: "expected a positive number",
                })?;
        }

        Ok(config)
    }

    pub fn with_fincheck_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.fincheck_home = Some(home.into());
        self
    }

    /// Call timeout clamped to the supported 10..=30 second window.
    pub fn effective_call_timeout(&self) -> Duration {
        self.call_timeout.clamp(
            Duration::from_secs(MIN_CALL_TIMEOUT_SECS),
            Duration::from_secs(MAX_CALL_TIMEOUT_SECS),
        )
    }

    pub fn store_config(&self) -> StoreConfig {
        match &self.fincheck_home {
            Some(home) => StoreConfig::in_home(home),
            None => StoreConfig::default(),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_concurrent_calls: self.max_concurrent_calls.max(1),
            call_timeout: self.effective_call_timeout(),
            live_ttl: self.live_ttl,
            derived_ttl: self.derived_ttl,
            ..ExecutorSettings::default()
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            concurrency: self.resolver_concurrency.max(1),
            ..ResolverSettings::default()
        }
    }

    pub fn verification_settings(&self) -> VerificationSettings {
        VerificationSettings {
            cross_verify_market_cap: self.cross_verify_market_cap,
            ..VerificationSettings::default()
        }
    }
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.parse::<T>()
        .ok()
        .filter(|value| *value > T::default())
        .ok_or_else(|| ConfigError::InvalidValue {
            name,
            value: raw.to_owned(),
            reason: "expected a positive integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = FactCheckConfig::from_lookup(lookup(&[])).expect("config");

        assert_eq!(config, FactCheckConfig::default());
        assert_eq!(config.call_timeout, Duration::from_secs(15));
        assert_eq!(config.cross_verify_market_cap, 1e11);
    }

    #[test]
    fn overrides_are_applied() {
        let config = FactCheckConfig::from_lookup(lookup(&[
            ("FINCHECK_HOME", "/tmp/fc"),
            ("FINCHECK_MAX_CONCURRENT_CALLS", "3"),
            ("FINCHECK_LIVE_TTL_SECS", " 60 "),
            ("FINCHECK_CROSS_VERIFY_MARKET_CAP", "5e11"),
        ]))
        .expect("config");

        assert_eq!(config.fincheck_home, Some(PathBuf::from("/tmp/fc")));
        assert_eq!(config.executor_settings().max_concurrent_calls, 3);
        assert_eq!(config.live_ttl, Duration::from_secs(60));
        assert_eq!(config.verification_settings().cross_verify_market_cap, 5e11);
        assert_eq!(
            config.store_config().db_path,
            PathBuf::from("/tmp/fc").join("cache").join("blobs.duckdb")
        );
    }

    #[test]
    fn call_timeout_is_clamped() {
        let short = FactCheckConfig::from_lookup(lookup(&[("FINCHECK_CALL_TIMEOUT_SECS", "2")])).expect("config");
        let long = FactCheckConfig::from_lookup(lookup(&[("FINCHECK_CALL_TIMEOUT_SECS", "90")])).expect("config");

        assert_eq!(short.executor_settings().call_timeout, Duration::from_secs(10));
        assert_eq!(long.executor_settings().call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = FactCheckConfig::from_lookup(lookup(&[("FINCHECK_MAX_CONCURRENT_CALLS", "many")]))
            .expect_err("invalid");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                name: "FINCHECK_MAX_CONCURRENT_CALLS",
                ..
            }
        ));

        assert!(FactCheckConfig::from_lookup(lookup(&[("FINCHECK_LIVE_TTL_SECS", "0")])).is_err());
        assert!(FactCheckConfig::from_lookup(lookup(&[("FINCHECK_CROSS_VERIFY_MARKET_CAP", "-1")])).is_err());
    }
}
