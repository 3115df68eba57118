use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::LookupIpStrategy;
use trust_dns_resolver::error::ResolveError;
use trust_dns_resolver::system_conf::read_system_conf;

use super::{DnsLookup, Exchanger, ResolverError, normalize_exchange};

pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform resolver, configured from the system (`/etc/resolv.conf` on unix).
///
/// The async resolver is driven by a private multi-thread runtime so that
/// blocking callers on separate threads get independent, concurrent lookups
/// instead of queueing behind one another.
pub struct SystemResolver {
    runtime: Runtime,
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn from_system_conf() -> Result<Self, ResolverError> {
        Self::with_timeout(DEFAULT_DNS_TIMEOUT)
    }

    /// Single attempt per query with the given timeout; retry policy belongs
    /// to callers.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ResolverError> {
        let (config, mut opts) = read_system_conf().map_err(ResolverError::setup)?;
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.ip_strategy = LookupIpStrategy::Ipv4Only;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mxprobe-dns")
            .enable_all()
            .build()
            .map_err(ResolverError::setup)?;
        let inner = {
            let _guard = runtime.enter();
            TokioAsyncResolver::tokio(config, opts)
        };
        Ok(Self { runtime, inner })
    }
}

impl DnsLookup for SystemResolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<Exchanger>, ResolveError> {
        let lookup = self.runtime.block_on(self.inner.mx_lookup(&*fqdn(domain)))?;
        Ok(lookup
            .iter()
            .map(|mx| Exchanger::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8())))
            .collect())
    }

    fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let lookup = self.runtime.block_on(self.inner.lookup_ip(&*fqdn(name)))?;
        Ok(lookup
            .iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect())
    }
}

/// Roots `name` so the system search list is never applied to it.
fn fqdn(name: &str) -> Cow<'_, str> {
    if name.ends_with('.') {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}."))
    }
}
