use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::probe::{LogEntry, ProbeResult, SessionLog, TransportMode};
use crate::rbl::{RblFinding, RblSummary};
use crate::resolver::Exchanger;

/// Probe outcome plus RBL verdicts for one exchanger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangerReport {
    pub host: String,
    pub priority: u16,
    pub connected: bool,
    pub ips: Vec<Ipv4Addr>,
    pub rbl_score: f64,
    pub blacklisted_details: Vec<RblFinding>,
    pub session_log: Vec<LogEntry>,
    pub transport: TransportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExchangerReport {
    pub(crate) fn assemble(
        exchanger: &Exchanger,
        probe: ProbeResult,
        ips: Vec<Ipv4Addr>,
        rbl: RblSummary,
    ) -> Self {
        Self {
            host: exchanger.host.clone(),
            priority: exchanger.priority,
            connected: probe.connected,
            ips,
            rbl_score: rbl.score(),
            blacklisted_details: rbl.blacklisted,
            session_log: probe.session_log,
            transport: probe.transport,
            details: probe.details,
        }
    }

    /// Placeholder for an exchanger whose task never reported back.
    pub(crate) fn unfinished(
        exchanger: &Exchanger,
        transport: TransportMode,
        reason: impl AsRef<str>,
    ) -> Self {
        let mut log = SessionLog::new();
        log.error(reason, None);
        Self {
            host: exchanger.host.clone(),
            priority: exchanger.priority,
            connected: false,
            ips: Vec::new(),
            rbl_score: 1.0,
            blacklisted_details: Vec::new(),
            session_log: log.finish(),
            transport,
            details: None,
        }
    }
}

/// Weighted contributors to [`ReputationResult::confidence`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub has_multiple_mx: f64,
    pub can_connect: f64,
    pub not_blacklisted: f64,
}

impl ConfidenceFactors {
    pub fn total(&self) -> f64 {
        self.has_multiple_mx + self.can_connect + self.not_blacklisted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub factors: ConfidenceFactors,
    /// Ascending by MX priority.
    pub exchangers: Vec<ExchangerReport>,
    pub total_exchangers: usize,
    pub working_exchangers: usize,
    pub transport: TransportMode,
}

impl ReputationResult {
    /// Verdict for a domain without any usable exchanger.
    pub fn no_exchangers(transport: TransportMode) -> Self {
        Self {
            is_valid: false,
            confidence: 0.0,
            factors: ConfidenceFactors::default(),
            exchangers: Vec::new(),
            total_exchangers: 0,
            working_exchangers: 0,
            transport,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangerAddresses {
    pub host: String,
    pub priority: u16,
    pub ips: Vec<Ipv4Addr>,
}

/// Probe-free view of a domain's MX set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxTopology {
    pub domain: String,
    pub exchangers: Vec<ExchangerAddresses>,
}
