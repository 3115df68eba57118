//! SMTP probing of a single mail exchanger.
//!
//! A probe walks a partial SMTP dialogue (`EHLO`, `MAIL FROM`, `RCPT TO`,
//! `QUIT`) without ever delivering mail, and returns whether the server is
//! alive together with a timestamped transcript. Any well-formed rejection
//! (`550/553/501/503`) counts as a live server.
//!
//! Probing is polymorphic over [`ProbeTransport`]: [`DirectTransport`] opens
//! raw sockets, [`ProxyTransport`] delegates to a remote HTTP service that
//! runs the same dialogue, [`DisabledTransport`] does nothing.

mod direct;
mod log;
mod machine;
mod proxy;
mod session;
mod types;

pub use direct::{DEFAULT_DIRECT_TIMEOUT, DEFAULT_SMTP_PORT, DirectTransport};
pub use log::{LogEntry, LogStep, SessionLog};
pub use machine::{Action, ProbeState, REJECTION_CODES, SmtpMachine};
pub use proxy::{DEFAULT_PROXY_TIMEOUT, DisabledTransport, ProxyTransport};
pub use session::SmtpReply;
pub use types::{ProbeResult, ProbeTransport, TransportMode};

pub const DEFAULT_PROBE_IDENTITY: &str = "probe.localdomain";

#[cfg(test)]
mod tests;
