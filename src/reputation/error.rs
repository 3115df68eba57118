use thiserror::Error;

use crate::config::ConfigError;
use crate::resolver::ResolverError;

/// Failures that reach engine callers.
///
/// Network outcomes never show up here: they are reported inside the
/// returned result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("resolver setup failed: {source}")]
    Resolver {
        #[source]
        source: ResolverError,
    },
}

impl EngineError {
    pub(crate) fn resolver(source: ResolverError) -> Self {
        Self::Resolver { source }
    }
}
