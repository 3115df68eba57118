use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::scoring;
use super::types::{ExchangerAddresses, ExchangerReport, MxTopology, ReputationResult};
use super::EngineError;
use crate::cache::{CacheBackend, ResultCache};
use crate::config::{ConfigError, EngineConfig};
use crate::probe::{DirectTransport, DisabledTransport, ProbeTransport, ProxyTransport, TransportMode};
use crate::rbl::RblChecker;
use crate::resolver::{DnsLookup, Exchanger, SystemResolver, normalize_domain, resolve_ipv4, resolve_mx};

/// Verifies a domain's mail exchangers and scores the outcome.
///
/// Built once per process and shared; every call is independent apart
/// from the optional result cache.
pub struct Engine {
    config: EngineConfig,
    lookup: Arc<dyn DnsLookup>,
    /// `None` when proxy mode lacks an endpoint; reported on each call.
    transport: Option<Arc<dyn ProbeTransport>>,
    rbl: RblChecker,
    cache: Option<ResultCache>,
}

impl Engine {
    /// Engine backed by the system DNS configuration.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let resolver =
            SystemResolver::with_timeout(config.dns_timeout).map_err(EngineError::resolver)?;
        Self::with_lookup(config, Arc::new(resolver))
    }

    pub fn with_lookup(
        config: EngineConfig,
        lookup: Arc<dyn DnsLookup>,
    ) -> Result<Self, EngineError> {
        let transport = build_transport(&config, &lookup)?;
        let rbl = RblChecker::new(Arc::clone(&lookup), config.rbl_providers.clone());
        Ok(Self {
            config,
            lookup,
            transport,
            rbl,
            cache: None,
        })
    }

    /// Replaces the transport derived from the configuration.
    pub fn with_transport(mut self, transport: Arc<dyn ProbeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enables read-through caching on an already opened backend.
    pub fn with_cache(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(ResultCache::new(
            backend,
            self.config.cache_key_prefix.clone(),
        ));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves, probes, RBL-checks and scores every exchanger of `domain`.
    ///
    /// Only configuration problems are errors. Unresolvable domains,
    /// unreachable exchangers and cache outages all produce a result.
    pub fn verify_exchangers(&self, domain: &str) -> Result<ReputationResult, EngineError> {
        self.config.validate()?;
        let transport = self
            .transport
            .clone()
            .ok_or(ConfigError::MissingProxyEndpoint)?;
        let mode = transport.mode();

        let ascii = match normalize_domain(domain) {
            Ok(ascii) => ascii,
            Err(err) => {
                warn!(domain, error = %err, "domain cannot be normalized");
                return Ok(ReputationResult::no_exchangers(mode));
            }
        };

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&ascii)) {
            return Ok(hit);
        }

        let exchangers = resolve_mx(self.lookup.as_ref(), &ascii);
        if exchangers.is_empty() {
            info!(domain = %ascii, "no MX records");
            return Ok(ReputationResult::no_exchangers(mode));
        }

        let (reports, complete) = self.fan_out(&ascii, &exchangers, transport);
        let result = scoring::score(reports, mode);
        info!(
            domain = %ascii,
            valid = result.is_valid,
            confidence = result.confidence,
            working = result.working_exchangers,
            total = result.total_exchangers,
            "verdict"
        );

        if complete {
            if let Some(cache) = &self.cache {
                if let Err(err) = cache.put(&ascii, &result, self.config.cache_ttl.exchangers) {
                    warn!(domain = %ascii, error = %err, "cache write failed");
                }
            }
        }
        Ok(result)
    }

    /// MX hosts of `domain` with their IPv4 addresses; no SMTP, no RBL.
    pub fn list_exchangers(&self, domain: &str) -> MxTopology {
        let ascii = match normalize_domain(domain) {
            Ok(ascii) => ascii,
            Err(err) => {
                warn!(domain, error = %err, "domain cannot be normalized");
                return MxTopology {
                    domain: domain.trim().to_string(),
                    exchangers: Vec::new(),
                };
            }
        };

        let exchangers = resolve_mx(self.lookup.as_ref(), &ascii);
        let lookup = self.lookup.as_ref();
        let addresses = thread::scope(|scope| {
            let handles: Vec<_> = exchangers
                .iter()
                .map(|mx| scope.spawn(move || resolve_ipv4(lookup, &mx.host)))
                .collect();
            handles
                .into_iter()
                .zip(&exchangers)
                .map(|(handle, mx)| ExchangerAddresses {
                    host: mx.host.clone(),
                    priority: mx.priority,
                    ips: handle.join().unwrap_or_default(),
                })
                .collect()
        });

        MxTopology {
            domain: ascii,
            exchangers: addresses,
        }
    }

    /// One detached thread per exchanger, collected until the aggregate
    /// deadline. Returns the reports in MX order and whether all of them
    /// finished.
    fn fan_out(
        &self,
        domain: &str,
        exchangers: &[Exchanger],
        transport: Arc<dyn ProbeTransport>,
    ) -> (Vec<ExchangerReport>, bool) {
        let mode = transport.mode();
        let (tx, rx) = mpsc::channel();
        for (index, exchanger) in exchangers.iter().enumerate() {
            let task = ExchangerTask {
                exchanger: exchanger.clone(),
                domain: domain.to_string(),
                transport: Arc::clone(&transport),
                lookup: Arc::clone(&self.lookup),
                rbl: self.rbl.clone(),
            };
            let tx = tx.clone();
            thread::spawn(move || {
                let report = task.run();
                // The receiver is gone once the deadline passed.
                let _ = tx.send((index, report));
            });
        }
        drop(tx);

        let started = Instant::now();
        let mut slots: Vec<Option<ExchangerReport>> = vec![None; exchangers.len()];
        let mut pending = exchangers.len();
        let mut deadline_hit = false;
        while pending > 0 {
            let received = match self.config.aggregate_deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_sub(started.elapsed());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((index, report)) => {
                    slots[index] = Some(report);
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    deadline_hit = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let reports = slots
            .into_iter()
            .zip(exchangers)
            .map(|(slot, exchanger)| {
                slot.unwrap_or_else(|| {
                    let reason = match (deadline_hit, self.config.aggregate_deadline) {
                        (true, Some(deadline)) => deadline_reason(&exchanger.host, deadline),
                        _ => format!("Verification of {} aborted", exchanger.host),
                    };
                    warn!(domain, host = %exchanger.host, "{reason}");
                    ExchangerReport::unfinished(exchanger, mode, reason)
                })
            })
            .collect();
        (reports, pending == 0)
    }
}

fn deadline_reason(host: &str, deadline: Duration) -> String {
    format!(
        "Verification of {host} exceeded the aggregate deadline of {}ms",
        deadline.as_millis()
    )
}

/// Everything one exchanger's worker thread owns.
struct ExchangerTask {
    exchanger: Exchanger,
    domain: String,
    transport: Arc<dyn ProbeTransport>,
    lookup: Arc<dyn DnsLookup>,
    rbl: RblChecker,
}

impl ExchangerTask {
    fn run(self) -> ExchangerReport {
        let probe = self.transport.probe(&self.exchanger.host, &self.domain);
        let ips = self.rbl_targets(&probe.ips, probe.transport);
        let rbl = self.rbl.check_ips(&ips);
        debug!(
            host = %self.exchanger.host,
            connected = probe.connected,
            ips = ips.len(),
            listed = rbl.blacklisted.len(),
            "exchanger checked"
        );
        ExchangerReport::assemble(&self.exchanger, probe, ips, rbl)
    }

    /// The proxy's answer is authoritative; otherwise reuse what the probe
    /// resolved and only look the host up again when it has nothing.
    fn rbl_targets(&self, probed: &[Ipv4Addr], mode: TransportMode) -> Vec<Ipv4Addr> {
        if mode == TransportMode::Proxy || !probed.is_empty() {
            return probed.to_vec();
        }
        resolve_ipv4(self.lookup.as_ref(), &self.exchanger.host)
    }
}

fn build_transport(
    config: &EngineConfig,
    lookup: &Arc<dyn DnsLookup>,
) -> Result<Option<Arc<dyn ProbeTransport>>, EngineError> {
    let transport: Arc<dyn ProbeTransport> = match config.transport {
        TransportMode::Direct => Arc::new(
            DirectTransport::new(Arc::clone(lookup), config.probe_identity.clone())
                .with_port(config.smtp_port)
                .with_timeout(config.direct_timeout),
        ),
        TransportMode::Proxy => {
            let endpoint = config
                .proxy_endpoint
                .as_deref()
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty());
            match endpoint {
                Some(endpoint) => Arc::new(ProxyTransport::new(endpoint, config.proxy_timeout)?),
                None => return Ok(None),
            }
        }
        TransportMode::Disabled => Arc::new(DisabledTransport),
    };
    Ok(Some(transport))
}
