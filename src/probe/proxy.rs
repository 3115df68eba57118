use std::net::Ipv4Addr;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::ConfigError;

use super::log::{LogEntry, SessionLog};
use super::types::{ProbeResult, ProbeTransport, TransportMode};

pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(15);

/// Payload returned by `GET <endpoint>/check?domain=<domain>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyResponse {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    session_log: Vec<LogEntry>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// Delegates the whole SMTP dialogue to a remote probe service, for hosts
/// where outbound port 25 is blocked.
#[derive(Debug, Clone)]
pub struct ProxyTransport {
    client: Client,
    endpoint: String,
}

impl ProxyTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingProxyEndpoint);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::http_client)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fetch(&self, domain: &str) -> Result<ProxyResponse, reqwest::Error> {
        self.client
            .get(format!("{}/check", self.endpoint))
            .query(&[("domain", domain)])
            .send()?
            .error_for_status()?
            .json()
    }
}

impl ProbeTransport for ProxyTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Proxy
    }

    fn probe(&self, host: &str, domain: &str) -> ProbeResult {
        tracing::debug!(endpoint = %self.endpoint, host, domain, "probing via proxy");

        let response = match self.fetch(domain) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint, domain, error = %err, "proxy probe failed");
                let mut log = SessionLog::new();
                log.error(format!("Proxy error: {err}"), None);
                return ProbeResult::finish(host, TransportMode::Proxy, false, Vec::new(), log);
            }
        };

        let ips: Vec<Ipv4Addr> = response
            .ip
            .as_deref()
            .and_then(|ip| match ip.trim().parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::debug!(ip, "proxy returned a non-IPv4 address, ignoring");
                    None
                }
            })
            .into_iter()
            .collect();

        let mut log = SessionLog::new();
        for entry in response.session_log {
            log.push(entry);
        }

        let result = ProbeResult::finish(host, TransportMode::Proxy, response.connected, ips, log);
        match response.details {
            None | Some(serde_json::Value::Null) => result,
            Some(serde_json::Value::String(details)) => result.with_details(details),
            Some(other) => result.with_details(other.to_string()),
        }
    }
}

/// Stand-in used when neither direct SMTP nor a proxy is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransport;

impl ProbeTransport for DisabledTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Disabled
    }

    fn probe(&self, host: &str, _domain: &str) -> ProbeResult {
        let mut log = SessionLog::new();
        log.info("SMTP testing disabled - configure proxy or enable direct testing");
        ProbeResult::finish(host, TransportMode::Disabled, false, Vec::new(), log)
    }
}
