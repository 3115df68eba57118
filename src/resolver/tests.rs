use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use trust_dns_resolver::error::ResolveError;

use super::{DnsLookup, Exchanger, ResolverError, normalize_domain, normalize_exchange, resolve_ipv4, resolve_mx};

/// In-memory DNS used across the crate's tests. Names that are not
/// registered fail the way an NXDOMAIN would.
#[derive(Default)]
pub(crate) struct StubLookup {
    mx: HashMap<String, Vec<Exchanger>>,
    a: HashMap<String, Vec<Ipv4Addr>>,
    pub mx_calls: AtomicUsize,
    pub a_calls: AtomicUsize,
    pub queried: Mutex<Vec<String>>,
}

impl StubLookup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_mx(mut self, domain: &str, records: &[(u16, &str)]) -> Self {
        let records = records
            .iter()
            .map(|(priority, host)| Exchanger::new(*priority, *host))
            .collect();
        self.mx.insert(domain.to_string(), records);
        self
    }

    pub(crate) fn with_a(mut self, name: &str, ips: &[Ipv4Addr]) -> Self {
        self.a.insert(name.to_string(), ips.to_vec());
        self
    }

    /// Registers `ip` as listed on `zone`.
    pub(crate) fn with_listing(self, ip: Ipv4Addr, zone: &str) -> Self {
        let name = crate::rbl::query_name(ip, zone);
        self.with_a(&name, &[Ipv4Addr::new(127, 0, 0, 2)])
    }

    pub(crate) fn a_calls(&self) -> usize {
        self.a_calls.load(Ordering::SeqCst)
    }
}

impl DnsLookup for StubLookup {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<Exchanger>, ResolveError> {
        self.mx_calls.fetch_add(1, Ordering::SeqCst);
        self.mx
            .get(domain)
            .cloned()
            .ok_or_else(|| ResolveError::from("NXDOMAIN"))
    }

    fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        self.a_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queried) = self.queried.lock() {
            queried.push(name.to_string());
        }
        self.a
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::from("NXDOMAIN"))
    }
}

#[test]
fn normalize_domain_rejects_empty() {
    let err = normalize_domain("  ").expect_err("empty domain should fail");
    assert!(matches!(err, ResolverError::Blank));
    assert_eq!(err.to_string(), "no domain given");
}

#[test]
fn normalize_domain_names_the_bad_label() {
    let err = normalize_domain("bad\u{0080}.example").expect_err("disallowed code point");
    assert!(matches!(&err, ResolverError::InvalidIdn { domain, .. } if domain == "bad\u{0080}.example"));
    assert!(err.to_string().ends_with("is not a valid internationalized domain name"));
}

#[test]
fn normalize_domain_lowercases_and_strips_root() {
    let out = normalize_domain(" Example.COM. ").expect("valid domain");
    assert_eq!(out, "example.com");
}

#[test]
fn normalize_domain_converts_idn() {
    let out = normalize_domain("bücher.de").expect("valid domain");
    assert_eq!(out, "xn--bcher-kva.de");
}

#[test]
fn resolve_mx_sorts_and_dedups_records() {
    let stub = StubLookup::new().with_mx(
        "example.com",
        &[
            (20, "mx2.example.com"),
            (10, "mx1.example.com"),
            (10, "mx1.example.com"),
            (30, "mx3.example.com"),
        ],
    );

    let records = resolve_mx(&stub, "example.com");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], Exchanger::new(10, "mx1.example.com"));
    assert_eq!(records[2].priority, 30);
}

#[test]
fn resolve_mx_failure_is_empty() {
    let stub = StubLookup::new();
    assert!(resolve_mx(&stub, "missing.example").is_empty());
}

#[test]
fn resolve_ipv4_keeps_order_and_drops_duplicates() {
    let a = Ipv4Addr::new(192, 0, 2, 10);
    let b = Ipv4Addr::new(192, 0, 2, 5);
    let stub = StubLookup::new().with_a("mx.example.com", &[a, b, a]);
    assert_eq!(resolve_ipv4(&stub, "mx.example.com"), vec![a, b]);
}

#[test]
fn resolve_ipv4_failure_is_empty() {
    let stub = StubLookup::new();
    assert!(resolve_ipv4(&stub, "mx.example.com").is_empty());
}

#[test]
fn normalize_exchange_trims_dot_and_lowercases() {
    assert_eq!(normalize_exchange("Mail.EXAMPLE.com."), "mail.example.com");
}
