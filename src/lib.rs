#![forbid(unsafe_code)]
//! mxprobe_lib: mail exchanger verification and reputation scoring.
//!
//! Given a domain, [`Engine::verify_exchangers`] resolves its MX set, runs a
//! partial SMTP dialogue against every exchanger (directly or through a
//! probe proxy), checks each exchanger address against DNS blacklists and
//! folds everything into one confidence score with full session traces.

pub mod cache;
pub mod config;
pub mod probe;
pub mod rbl;
pub mod reputation;
pub mod resolver;

pub use cache::{CacheBackend, CacheError, MemoryBackend, ReferenceList, ResultCache};
pub use config::{CacheTtl, ConfigError, EngineConfig};
pub use probe::{LogEntry, LogStep, ProbeResult, ProbeTransport, TransportMode};
pub use rbl::{RblChecker, RblFinding};
pub use reputation::{
    ConfidenceFactors, Engine, EngineError, ExchangerAddresses, ExchangerReport, MxTopology,
    ReputationResult,
};
pub use resolver::{DnsLookup, Exchanger, ResolverError, SystemResolver};
