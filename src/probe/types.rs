use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::log::{LogEntry, SessionLog};

/// How exchangers are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Raw TCP to port 25 of each resolved address.
    #[default]
    Direct,
    /// Delegated to a remote HTTP probe service.
    Proxy,
    /// No SMTP probing at all.
    Disabled,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "proxy" => Ok(Self::Proxy),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            other => Err(format!("unknown transport '{other}', use: direct|proxy|disabled")),
        }
    }
}

/// Outcome of probing one exchanger. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub host: String,
    pub connected: bool,
    pub ips: Vec<Ipv4Addr>,
    pub session_log: Vec<LogEntry>,
    pub transport: TransportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProbeResult {
    pub(crate) fn finish(
        host: &str,
        transport: TransportMode,
        connected: bool,
        ips: Vec<Ipv4Addr>,
        log: SessionLog,
    ) -> Self {
        Self {
            host: host.to_string(),
            connected,
            ips,
            session_log: log.finish(),
            transport,
            details: None,
        }
    }

    pub(crate) fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A way of exercising the SMTP dialogue against one exchanger.
///
/// Implementations absorb every transport failure into the returned
/// [`ProbeResult`] (`connected = false` plus an `error` log entry).
pub trait ProbeTransport: Send + Sync {
    fn mode(&self) -> TransportMode;

    fn probe(&self, host: &str, domain: &str) -> ProbeResult;
}
