use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::resolver::DnsLookup;

use super::log::SessionLog;
use super::machine::{Action, SmtpMachine};
use super::session::{Incoming, SmtpSession, error_code, is_timeout};
use super::types::{ProbeResult, ProbeTransport, TransportMode};

pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_DIRECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes an exchanger over raw TCP, trying each resolved IPv4 address in
/// order until one session completes.
#[derive(Clone)]
pub struct DirectTransport {
    lookup: Arc<dyn DnsLookup>,
    identity: String,
    port: u16,
    timeout: Duration,
}

impl DirectTransport {
    pub fn new(lookup: Arc<dyn DnsLookup>, identity: impl Into<String>) -> Self {
        Self {
            lookup,
            identity: identity.into(),
            port: DEFAULT_SMTP_PORT,
            timeout: DEFAULT_DIRECT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Wall-clock budget for one address, from connect to the last reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn probe_ip(&self, ip: Ipv4Addr, domain: &str, log: &mut SessionLog) -> bool {
        let addr = SocketAddr::from((ip, self.port));
        let mut machine = SmtpMachine::new(self.identity.as_str(), domain);

        log.info(format!("Attempting connection to {addr}"));
        let mut session = match SmtpSession::connect(&addr, self.timeout) {
            Ok(session) => session,
            Err(err) => {
                record_failure(log, &addr, Stage::Connect, &err);
                machine.on_failure();
                return false;
            }
        };
        machine.on_connect();
        log.info(format!("Connected to {addr}"));

        loop {
            let incoming = match session.read_reply() {
                Ok(incoming) => incoming,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    record_failure(log, &addr, Stage::Dialogue, &err);
                    machine.on_failure();
                    return false;
                }
            };

            let action = match incoming {
                Incoming::Reply(reply) => {
                    log.receive(reply.to_string());
                    machine.on_reply(&reply)
                }
                Incoming::Unparseable(text) => {
                    log.info_with(format!("Unrecognised reply from {addr}"), text);
                    machine.on_unparseable()
                }
            };

            match action {
                Action::Send(command) => {
                    log.send(&command);
                    if let Err(err) = session.send_line(&command) {
                        record_failure(log, &addr, Stage::Dialogue, &err);
                        machine.on_failure();
                        return false;
                    }
                }
                Action::Close => break,
            }
        }

        drop(session);
        log.info(format!("Connection to {addr} closed"));
        machine.on_close()
    }
}

impl ProbeTransport for DirectTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }

    fn probe(&self, host: &str, domain: &str) -> ProbeResult {
        let mut log = SessionLog::new();

        let ips = match self.lookup.lookup_ipv4(host) {
            Ok(ips) if !ips.is_empty() => ips,
            Ok(_) => {
                log.error("No IPv4 addresses found", None);
                return ProbeResult::finish(host, TransportMode::Direct, false, Vec::new(), log);
            }
            Err(err) => {
                log.error(format!("Failed to resolve IPs for {host}"), Some(err.to_string()));
                return ProbeResult::finish(host, TransportMode::Direct, false, Vec::new(), log);
            }
        };
        log.info_with(format!("Resolved IPs for {host}"), join_ips(&ips));

        for ip in &ips {
            if self.probe_ip(*ip, domain, &mut log) {
                tracing::debug!(host, %ip, "exchanger answered");
                return ProbeResult::finish(host, TransportMode::Direct, true, ips, log);
            }
        }

        tracing::debug!(host, tried = ips.len(), "no address answered");
        let details = format!("Tried IPs: {}", join_ips(&ips));
        ProbeResult::finish(host, TransportMode::Direct, false, ips, log).with_details(details)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    Dialogue,
}

fn record_failure(log: &mut SessionLog, addr: &SocketAddr, stage: Stage, err: &io::Error) {
    if is_timeout(err) {
        log.error(format!("Connection to {addr} timed out"), None);
        return;
    }
    let message = match stage {
        Stage::Connect => format!("Error connecting to {addr}: {err}"),
        Stage::Dialogue => format!("Error in SMTP dialogue with {addr}: {err}"),
    };
    log.error(message, Some(error_code(err)));
}

fn join_ips(ips: &[Ipv4Addr]) -> String {
    ips.iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
