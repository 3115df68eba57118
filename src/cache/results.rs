use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{CacheBackend, CacheError};
use crate::reputation::ReputationResult;

/// Domain-keyed store of completed verification results.
///
/// Reads never fail: a backend error or an undecodable entry is a miss.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, domain: &str) -> String {
        format!("{}:mx:{}", self.prefix, domain)
    }

    pub fn get(&self, domain: &str) -> Option<ReputationResult> {
        let key = self.key(domain);
        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(result) => {
                debug!(%key, "cache hit");
                Some(result)
            }
            Err(source) => {
                let err = CacheError::serialization(&key, source);
                warn!(%key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub fn put(
        &self,
        domain: &str,
        result: &ReputationResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = self.key(domain);
        let raw =
            serde_json::to_string(result).map_err(|source| CacheError::serialization(&key, source))?;
        self.backend.set_ex(&key, &raw, ttl)
    }
}
