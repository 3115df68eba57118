use super::types::{ConfidenceFactors, ExchangerReport, ReputationResult};
use crate::probe::TransportMode;

pub const MULTIPLE_MX_WEIGHT: f64 = 0.2;
pub const CONNECT_WEIGHT: f64 = 0.4;
pub const NOT_BLACKLISTED_WEIGHT: f64 = 0.4;
/// An exchanger only vouches for the domain above this RBL score.
pub const MIN_VALID_RBL_SCORE: f64 = 0.5;

pub fn factors(reports: &[ExchangerReport]) -> ConfidenceFactors {
    if reports.is_empty() {
        return ConfidenceFactors::default();
    }
    let worst_rbl = reports
        .iter()
        .map(|r| r.rbl_score)
        .fold(1.0_f64, f64::min);

    ConfidenceFactors {
        has_multiple_mx: if reports.len() > 1 { MULTIPLE_MX_WEIGHT } else { 0.0 },
        can_connect: if reports.iter().any(|r| r.connected) {
            CONNECT_WEIGHT
        } else {
            0.0
        },
        not_blacklisted: NOT_BLACKLISTED_WEIGHT * worst_rbl.clamp(0.0, 1.0),
    }
}

pub fn confidence(factors: &ConfidenceFactors) -> f64 {
    factors.total().clamp(0.0, 1.0)
}

/// At least one exchanger that both answered and is mostly unlisted.
pub fn is_valid(reports: &[ExchangerReport]) -> bool {
    reports
        .iter()
        .any(|r| r.connected && r.rbl_score > MIN_VALID_RBL_SCORE)
}

/// Final verdict; `reports` is re-sorted by priority.
pub fn score(mut reports: Vec<ExchangerReport>, transport: TransportMode) -> ReputationResult {
    if reports.is_empty() {
        return ReputationResult::no_exchangers(transport);
    }
    reports.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.host.cmp(&b.host)));

    let factors = factors(&reports);
    ReputationResult {
        is_valid: is_valid(&reports),
        confidence: confidence(&factors),
        factors,
        total_exchangers: reports.len(),
        working_exchangers: reports.iter().filter(|r| r.connected).count(),
        exchangers: reports,
        transport,
    }
}
