use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{CacheBackend, ListSourceError};

pub const IANA_TLDS_URL: &str = "https://data.iana.org/TLD/tlds-alpha-by-domain.txt";
pub const DISPOSABLE_DOMAINS_URL: &str = "https://raw.githubusercontent.com/disposable-email-domains/disposable-email-domains/master/disposable_email_blocklist.conf";
pub const DEFAULT_LIST_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a reference list comes from when neither memory nor the backend
/// holds it.
pub trait ListSource: Send + Sync {
    fn fetch(&self) -> Result<HashSet<String>, ListSourceError>;
}

/// Plain-text list over HTTP, one entry per line.
pub struct HttpListSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpListSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ListSourceError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ListSourceError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ListSource for HttpListSource {
    fn fetch(&self) -> Result<HashSet<String>, ListSourceError> {
        let http = |source| ListSourceError::Http {
            url: self.url.clone(),
            source,
        };
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(http)?;
        let entries = parse_list(&body);
        if entries.is_empty() {
            return Err(ListSourceError::Empty);
        }
        Ok(entries)
    }
}

/// Lowercased, trimmed entries; blank lines and `#` comments are skipped.
pub fn parse_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_ascii_lowercase)
        .collect()
}

struct Holdover {
    entries: Arc<HashSet<String>>,
    loaded_at: Instant,
}

/// Named set of strings with a cache lifetime.
///
/// Lookup order: a fresh in-process copy, the shared backend, then the
/// source. A failed refresh keeps serving the previous copy, however old.
pub struct ReferenceList {
    name: String,
    key: String,
    ttl: Duration,
    backend: Arc<dyn CacheBackend>,
    source: Box<dyn ListSource>,
    holdover: Mutex<Option<Holdover>>,
}

impl ReferenceList {
    pub fn new(
        name: impl Into<String>,
        prefix: &str,
        ttl: Duration,
        backend: Arc<dyn CacheBackend>,
        source: Box<dyn ListSource>,
    ) -> Self {
        let name = name.into();
        Self {
            key: format!("{prefix}:lists:{name}"),
            name,
            ttl,
            backend,
            source,
            holdover: Mutex::new(None),
        }
    }

    /// Top-level domains published by IANA.
    pub fn iana_tlds(
        prefix: &str,
        ttl: Duration,
        backend: Arc<dyn CacheBackend>,
    ) -> Result<Self, ListSourceError> {
        let source = HttpListSource::new(IANA_TLDS_URL, DEFAULT_LIST_FETCH_TIMEOUT)?;
        Ok(Self::new("tlds", prefix, ttl, backend, Box::new(source)))
    }

    /// Known throwaway mailbox providers.
    pub fn disposable_domains(
        prefix: &str,
        ttl: Duration,
        backend: Arc<dyn CacheBackend>,
    ) -> Result<Self, ListSourceError> {
        let source = HttpListSource::new(DISPOSABLE_DOMAINS_URL, DEFAULT_LIST_FETCH_TIMEOUT)?;
        Ok(Self::new("disposable", prefix, ttl, backend, Box::new(source)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Arc<HashSet<String>> {
        let stale = match self.holdover.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(h) if h.loaded_at.elapsed() < self.ttl => return Arc::clone(&h.entries),
                Some(h) => Some(Arc::clone(&h.entries)),
                None => None,
            },
            Err(_) => None,
        };

        if let Some(entries) = self.from_backend() {
            return self.remember(entries);
        }

        match self.source.fetch() {
            Ok(entries) => {
                info!(list = %self.name, entries = entries.len(), "reference list fetched");
                self.write_back(&entries);
                self.remember(entries)
            }
            Err(err) => {
                warn!(list = %self.name, error = %err, "reference list refresh failed");
                stale.unwrap_or_default()
            }
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.load().contains(&item.trim().to_ascii_lowercase())
    }

    fn from_backend(&self) -> Option<HashSet<String>> {
        let raw = match self.backend.get(&self.key) {
            Ok(raw) => raw?,
            Err(err) => {
                debug!(list = %self.name, error = %err, "reference list backend read failed");
                return None;
            }
        };
        let entries: Vec<String> = serde_json::from_str(&raw).ok()?;
        (!entries.is_empty()).then(|| entries.into_iter().collect())
    }

    fn write_back(&self, entries: &HashSet<String>) {
        let mut sorted: Vec<&String> = entries.iter().collect();
        sorted.sort();
        let result = serde_json::to_string(&sorted)
            .map_err(|source| super::CacheError::serialization(&self.key, source))
            .and_then(|raw| self.backend.set_ex(&self.key, &raw, self.ttl));
        if let Err(err) = result {
            warn!(list = %self.name, error = %err, "reference list write-back failed");
        }
    }

    fn remember(&self, entries: HashSet<String>) -> Arc<HashSet<String>> {
        let entries = Arc::new(entries);
        if let Ok(mut guard) = self.holdover.lock() {
            *guard = Some(Holdover {
                entries: Arc::clone(&entries),
                loaded_at: Instant::now(),
            });
        }
        entries
    }
}
