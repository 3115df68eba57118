//! Reputation aggregation: fan out over a domain's exchangers, fan in to
//! one weighted confidence verdict.
//!
//! ```text
//! domain -> MX set -> per exchanger { probe -> IPs -> RBL } -> score
//! ```
//!
//! Exchangers run concurrently and finish in any order; reports are always
//! returned sorted by MX priority.

mod engine;
mod error;
pub mod scoring;
mod types;

pub use engine::Engine;
pub use error::EngineError;
pub use types::{
    ConfidenceFactors, ExchangerAddresses, ExchangerReport, MxTopology, ReputationResult,
};
