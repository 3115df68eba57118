use serde::{Deserialize, Serialize};

/// One MX record. Ordering is by priority first (lower is preferred), then host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Exchanger {
    pub priority: u16,
    pub host: String,
}

impl Exchanger {
    pub fn new(priority: u16, host: impl Into<String>) -> Self {
        Self {
            priority,
            host: host.into(),
        }
    }
}
