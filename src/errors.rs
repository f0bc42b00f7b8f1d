//! Error types for the resource pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by the user supplied factory, close and ping callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared form of a callback error, so that [`PoolError`] stays `Clone`.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Config(String),

    #[error("failed to create resource: {0}")]
    Factory(#[source] SharedError),

    #[error("pool is exhausted - maximum live resources reached")]
    PoolExhausted,

    #[error("no resource became available within {0:?}")]
    WaitTimeout(Duration),

    #[error("pool is closed")]
    PoolClosed,

    #[error("resource does not belong to this pool")]
    InvalidResource,

    #[error("failed to close resource: {0}")]
    CloseFailed(#[source] SharedError),

    #[error("health check failed: {0}")]
    HealthCheck(#[source] SharedError),

    #[error("operation was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn factory(err: BoxError) -> Self {
        PoolError::Factory(Arc::from(err))
    }

    pub(crate) fn close_failed(err: BoxError) -> Self {
        PoolError::CloseFailed(Arc::from(err))
    }

    pub(crate) fn health_check(err: BoxError) -> Self {
        PoolError::HealthCheck(Arc::from(err))
    }

    /// Whether the caller gave up waiting, as opposed to being rejected without waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::WaitTimeout(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_error_keeps_source() {
        let err = PoolError::factory("connection refused".into());
        assert_eq!(err.to_string(), "failed to create resource: connection refused");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_timeout_is_distinguishable_from_exhaustion() {
        assert!(PoolError::WaitTimeout(Duration::from_millis(50)).is_timeout());
        assert!(!PoolError::PoolExhausted.is_timeout());
    }
}
