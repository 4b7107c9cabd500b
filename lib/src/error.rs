//! Error types.

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A stored validator could not be rendered back into a request header.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A pluggable store backend failed.
    ///
    /// Backend failures pass through the engine unmodified so that callers can
    /// tell a failing store apart from a cache miss; the engine performs no
    /// retry and no fallback.
    #[error("content store backend error: {0}")]
    StoreBackend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a store backend failure for propagation through the engine.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::StoreBackend(Box::new(err))
    }
}
