//! Shared result cache and reference lists.
//!
//! One [`CacheBackend`] is opened at process start and handed to every
//! consumer; [`ResultCache`] stores verification results per domain and
//! [`ReferenceList`] keeps slow-changing string sets.

mod backend;
mod error;
mod lists;
mod results;

pub use backend::{CacheBackend, MemoryBackend};
pub use error::{CacheError, ListSourceError};
pub use lists::{
    DEFAULT_LIST_FETCH_TIMEOUT, DISPOSABLE_DOMAINS_URL, HttpListSource, IANA_TLDS_URL, ListSource,
    ReferenceList, parse_list,
};
pub use results::ResultCache;
