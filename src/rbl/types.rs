use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Listing status of one IP on one blacklist zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RblFinding {
    pub ip: Ipv4Addr,
    pub provider: String,
    pub listed: bool,
}

/// All RBL checks run for one exchanger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RblSummary {
    /// Listed entries only; unlisted pairs are counted but not retained.
    pub blacklisted: Vec<RblFinding>,
    pub total_checks: usize,
}

impl RblSummary {
    pub fn from_findings(findings: Vec<RblFinding>) -> Self {
        let total_checks = findings.len();
        let blacklisted = findings.into_iter().filter(|f| f.listed).collect();
        Self {
            blacklisted,
            total_checks,
        }
    }

    pub fn empty() -> Self {
        Self {
            blacklisted: Vec::new(),
            total_checks: 0,
        }
    }

    /// `1 - listed / checked`, or `1.0` when nothing was checked.
    pub fn score(&self) -> f64 {
        if self.total_checks == 0 {
            return 1.0;
        }
        1.0 - self.blacklisted.len() as f64 / self.total_checks as f64
    }
}
