//! Engine configuration, read once at process start.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::{
    DEFAULT_DIRECT_TIMEOUT, DEFAULT_PROBE_IDENTITY, DEFAULT_PROXY_TIMEOUT, DEFAULT_SMTP_PORT,
};
use crate::resolver::DEFAULT_DNS_TIMEOUT;

pub use crate::probe::TransportMode;

pub const DEFAULT_EXCHANGER_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_LISTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_AGGREGATE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("proxy transport selected but no proxy endpoint configured")]
    MissingProxyEndpoint,
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("HTTP client initialization failed: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },
}

impl ConfigError {
    pub(crate) fn http_client(source: reqwest::Error) -> Self {
        Self::HttpClient { source }
    }

    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Per-result-class cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtl {
    pub exchangers: Duration,
    pub reference_lists: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            exchangers: DEFAULT_EXCHANGER_TTL,
            reference_lists: DEFAULT_LISTS_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub transport: TransportMode,
    pub proxy_endpoint: Option<String>,
    pub rbl_providers: Vec<String>,
    pub probe_identity: String,
    pub smtp_port: u16,
    pub direct_timeout: Duration,
    pub proxy_timeout: Duration,
    pub dns_timeout: Duration,
    /// Upper bound for one `verify_exchangers` call. `None` waits for the
    /// slowest probe.
    pub aggregate_deadline: Option<Duration>,
    pub cache_ttl: CacheTtl,
    pub cache_key_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::Direct,
            proxy_endpoint: None,
            rbl_providers: crate::rbl::default_providers(),
            probe_identity: DEFAULT_PROBE_IDENTITY.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            direct_timeout: DEFAULT_DIRECT_TIMEOUT,
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            aggregate_deadline: Some(DEFAULT_AGGREGATE_DEADLINE),
            cache_ttl: CacheTtl::default(),
            cache_key_prefix: "dev".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_proxy_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_rbl_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rbl_providers = providers
            .into_iter()
            .filter_map(|p| normalize_zone(p.into()))
            .collect();
        self
    }

    pub fn with_probe_identity(mut self, identity: impl Into<String>) -> Self {
        self.probe_identity = identity.into();
        self
    }

    pub fn with_aggregate_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.aggregate_deadline = deadline;
        self
    }

    pub fn with_cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = prefix.into();
        self
    }

    /// Reads the process environment. See [`EngineConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `get`, starting from defaults.
    ///
    /// Keys: `MXPROBE_TRANSPORT`, `SMTP_PROXY_ENABLED`, `SMTP_PROXY_URL`,
    /// `MXPROBE_RBL_PROVIDERS`, `MXPROBE_PROBE_IDENTITY`,
    /// `MXPROBE_CACHE_TTL_SECS`, `MXPROBE_LISTS_TTL_SECS`,
    /// `MXPROBE_DEADLINE_SECS` (`0` disables the deadline), `MXPROBE_ENV`.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| get(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read("SMTP_PROXY_ENABLED") {
            if value.trim().eq_ignore_ascii_case("true") {
                config.transport = TransportMode::Proxy;
            }
        }
        if let Some(value) = read("MXPROBE_TRANSPORT") {
            config.transport = value
                .parse()
                .map_err(|reason| ConfigError::invalid("MXPROBE_TRANSPORT", &value, reason))?;
        }
        if let Some(url) = read("SMTP_PROXY_URL") {
            config.proxy_endpoint = Some(url.trim().to_string());
        }
        if let Some(list) = read("MXPROBE_RBL_PROVIDERS") {
            config = config.with_rbl_providers(list.split(',').map(str::to_string));
        }
        if let Some(identity) = read("MXPROBE_PROBE_IDENTITY") {
            config.probe_identity = identity.trim().to_string();
        }
        if let Some(value) = read("MXPROBE_CACHE_TTL_SECS") {
            config.cache_ttl.exchangers = parse_secs("MXPROBE_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read("MXPROBE_LISTS_TTL_SECS") {
            config.cache_ttl.reference_lists = parse_secs("MXPROBE_LISTS_TTL_SECS", &value)?;
        }
        if let Some(value) = read("MXPROBE_DEADLINE_SECS") {
            let deadline = parse_secs("MXPROBE_DEADLINE_SECS", &value)?;
            config.aggregate_deadline = (!deadline.is_zero()).then_some(deadline);
        }
        if let Some(env) = read("MXPROBE_ENV") {
            config.cache_key_prefix = env_prefix(&env).to_string();
        }

        Ok(config)
    }

    /// Checks the combination of settings a call depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport == TransportMode::Proxy
            && self
                .proxy_endpoint
                .as_deref()
                .is_none_or(|endpoint| endpoint.trim().is_empty())
        {
            return Err(ConfigError::MissingProxyEndpoint);
        }
        Ok(())
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| ConfigError::invalid(key, value, err))
}

fn env_prefix(env: &str) -> &'static str {
    match env.trim().to_ascii_lowercase().as_str() {
        "production" | "prod" => "prod",
        "test" => "test",
        _ => "dev",
    }
}

fn normalize_zone(zone: String) -> Option<String> {
    let trimmed = zone.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.transport, TransportMode::Direct);
        assert_eq!(config.rbl_providers.len(), 4);
        assert_eq!(config.cache_ttl.exchangers, Duration::from_secs(3600));
        assert_eq!(config.cache_ttl.reference_lists, Duration::from_secs(86_400));
        assert_eq!(config.direct_timeout, Duration::from_secs(10));
        assert_eq!(config.proxy_timeout, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn proxy_flag_and_url_select_proxy() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SMTP_PROXY_ENABLED", "true"),
            ("SMTP_PROXY_URL", " https://probe.example.net "),
            ("MXPROBE_ENV", "production"),
        ]))
        .expect("valid env");
        assert_eq!(config.transport, TransportMode::Proxy);
        assert_eq!(config.proxy_endpoint.as_deref(), Some("https://probe.example.net"));
        assert_eq!(config.cache_key_prefix, "prod");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn proxy_without_endpoint_fails_validation() {
        let config = EngineConfig::new().with_transport(TransportMode::Proxy);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProxyEndpoint)
        ));
    }

    #[test]
    fn provider_list_is_normalized() {
        let config = EngineConfig::from_lookup(lookup(&[(
            "MXPROBE_RBL_PROVIDERS",
            " Zen.Spamhaus.org. , ,bl.spamcop.net",
        )]))
        .expect("valid env");
        assert_eq!(config.rbl_providers, vec!["zen.spamhaus.org", "bl.spamcop.net"]);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = EngineConfig::from_lookup(lookup(&[("MXPROBE_CACHE_TTL_SECS", "soon")]))
            .expect_err("not a number");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MXPROBE_CACHE_TTL_SECS",
                ..
            }
        ));
    }

    #[test]
    fn zero_deadline_disables_it() {
        let config = EngineConfig::from_lookup(lookup(&[("MXPROBE_DEADLINE_SECS", "0")]))
            .expect("valid env");
        assert_eq!(config.aggregate_deadline, None);
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("MXPROBE_TRANSPORT", "carrier-pigeon")]))
            .expect_err("unknown transport");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
