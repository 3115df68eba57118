//! DNS-based blacklist (RBL) lookups for exchanger addresses.
//!
//! An IP `a.b.c.d` is listed on `zone` when `d.c.b.a.zone` resolves to any
//! A record. Lookup failures count as "not listed": a transient DNS error
//! must not turn into a false positive.

mod types;

pub use types::{RblFinding, RblSummary};

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;

use crate::resolver::{DnsLookup, is_not_found};

pub const DEFAULT_PROVIDERS: [&str; 4] = [
    "zen.spamhaus.org",
    "bl.spamcop.net",
    "dnsbl.sorbs.net",
    "b.barracudacentral.org",
];

pub fn default_providers() -> Vec<String> {
    DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect()
}

/// Reverse-octet query name for `ip` under `zone`, rooted with a trailing
/// dot so resolver search domains are never appended.
pub fn query_name(ip: Ipv4Addr, zone: &str) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}.{}.", zone.trim_matches('.'))
}

#[derive(Clone)]
pub struct RblChecker {
    lookup: Arc<dyn DnsLookup>,
    providers: Vec<String>,
}

impl RblChecker {
    pub fn new(lookup: Arc<dyn DnsLookup>, providers: Vec<String>) -> Self {
        Self { lookup, providers }
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn check_listing(&self, ip: Ipv4Addr, provider: &str) -> bool {
        let name = query_name(ip, provider);
        match self.lookup.lookup_ipv4(&name) {
            Ok(answers) => {
                let listed = !answers.is_empty();
                if listed {
                    tracing::info!(%ip, provider, "address listed");
                }
                listed
            }
            Err(err) => {
                if !is_not_found(&err) {
                    tracing::debug!(%ip, provider, error = %err, "RBL lookup failed, assuming not listed");
                }
                false
            }
        }
    }

    /// Checks every `(ip, provider)` pair concurrently, one thread per pair.
    pub fn check_ips(&self, ips: &[Ipv4Addr]) -> RblSummary {
        let pairs: Vec<(Ipv4Addr, &str)> = ips
            .iter()
            .flat_map(|ip| self.providers.iter().map(move |p| (*ip, p.as_str())))
            .collect();
        if pairs.is_empty() {
            return RblSummary::empty();
        }

        let findings = thread::scope(|scope| {
            let handles: Vec<_> = pairs
                .iter()
                .map(|&(ip, provider)| scope.spawn(move || self.check_listing(ip, provider)))
                .collect();

            handles
                .into_iter()
                .zip(&pairs)
                .map(|(handle, &(ip, provider))| RblFinding {
                    ip,
                    provider: provider.to_string(),
                    listed: handle.join().unwrap_or(false),
                })
                .collect()
        });

        RblSummary::from_findings(findings)
    }
}
