use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no domain given")]
    Blank,
    #[error("'{domain}' is not a valid internationalized domain name")]
    InvalidIdn {
        domain: String,
        #[source]
        source: idna::Errors,
    },
    #[error("could not set up the system DNS resolver: {source}")]
    Setup {
        #[source]
        source: std::io::Error,
    },
}

impl ResolverError {
    pub(crate) fn invalid_idn(domain: &str, source: idna::Errors) -> Self {
        Self::InvalidIdn {
            domain: domain.to_string(),
            source,
        }
    }

    pub(crate) fn setup(source: std::io::Error) -> Self {
        Self::Setup { source }
    }
}
