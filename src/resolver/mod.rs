//! DNS resolution for the engine: MX topology and IPv4 addresses.
//!
//! Lookup failures (NXDOMAIN, SERVFAIL, timeouts) are reported to callers as
//! empty results. Absence of records is a valid outcome, not a system error.

mod error;
mod system;
mod types;

pub use error::ResolverError;
pub use system::{DEFAULT_DNS_TIMEOUT, SystemResolver};
pub use types::Exchanger;

use std::net::Ipv4Addr;

use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

/// Raw lookup seam. Implementations return resolver errors untouched; the
/// free functions in this module decide how those errors are absorbed.
pub trait DnsLookup: Send + Sync {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<Exchanger>, ResolveError>;
    fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolveError>;
}

/// MX records for `ascii_domain`, sorted ascending by priority and de-duplicated.
pub fn resolve_mx<L>(lookup: &L, ascii_domain: &str) -> Vec<Exchanger>
where
    L: DnsLookup + ?Sized,
{
    let mut records = match lookup.lookup_mx(ascii_domain) {
        Ok(records) => records,
        Err(err) => {
            log_lookup_failure("MX", ascii_domain, &err);
            return Vec::new();
        }
    };

    records.sort();
    records.dedup();
    records
}

/// IPv4 addresses of `host`, in resolution order.
pub fn resolve_ipv4<L>(lookup: &L, host: &str) -> Vec<Ipv4Addr>
where
    L: DnsLookup + ?Sized,
{
    match lookup.lookup_ipv4(host) {
        Ok(mut ips) => {
            let mut seen = Vec::with_capacity(ips.len());
            ips.retain(|ip| {
                if seen.contains(ip) {
                    false
                } else {
                    seen.push(*ip);
                    true
                }
            });
            ips
        }
        Err(err) => {
            log_lookup_failure("A", host, &err);
            Vec::new()
        }
    }
}

pub fn normalize_domain(domain: &str) -> Result<String, ResolverError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(ResolverError::Blank);
    }
    idna::domain_to_ascii(trimmed).map_err(|err| ResolverError::invalid_idn(trimmed, err))
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

pub(crate) fn is_not_found(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

fn log_lookup_failure(kind: &str, name: &str, err: &ResolveError) {
    if is_not_found(err) {
        tracing::debug!(record = kind, name, "no records found");
    } else {
        tracing::warn!(record = kind, name, error = %err, "lookup failed, treating as empty");
    }
}

#[cfg(test)]
pub(crate) mod tests;
