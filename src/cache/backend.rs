use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::CacheError;

/// Key/value store with per-key expiry, shared process-wide.
///
/// Constructed explicitly and injected; callers own the `open`/`close`
/// lifecycle. Reads and writes are independent per key.
pub trait CacheBackend: Send + Sync {
    fn open(&self) -> Result<(), CacheError>;

    fn close(&self) -> Result<(), CacheError>;

    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    entries: HashMap<String, (String, Instant)>,
}

/// In-process backend. Expiry is passive: stale entries are dropped when read.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for callers that never need the closed state.
    pub fn opened() -> Self {
        let backend = Self::new();
        if let Ok(mut state) = backend.state.lock() {
            state.open = true;
        }
        backend
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, MemoryState>, CacheError> {
        let state = self.state.lock().map_err(|_| CacheError::Poisoned)?;
        if !state.open {
            return Err(CacheError::Closed);
        }
        Ok(state)
    }
}

impl CacheBackend for MemoryBackend {
    fn open(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().map_err(|_| CacheError::Poisoned)?;
        state.open = true;
        Ok(())
    }

    fn close(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().map_err(|_| CacheError::Poisoned)?;
        state.open = false;
        state.entries.clear();
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut state = self.lock_open()?;
        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some((value, expires_at)) if Instant::now() < *expires_at => {
                return Ok(Some(value.clone()));
            }
            Some(_) => true,
        };
        if expired {
            state.entries.remove(key);
        }
        Ok(None)
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut state = self.lock_open()?;
        state
            .entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.lock_open()?;
        state.entries.remove(key);
        Ok(())
    }
}
