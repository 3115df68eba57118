use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend is not open")]
    Closed,
    #[error("cache backend state is poisoned")]
    Poisoned,
    #[error("cache entry {key} could not be (de)serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }
}

/// Failures fetching a reference list from its authority.
#[derive(Debug, Error)]
pub enum ListSourceError {
    #[error("list fetch from {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("list source returned no entries")]
    Empty,
}
