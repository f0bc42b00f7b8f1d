//! Pool configuration options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{BoxError, PoolError, PoolResult};

pub(crate) type FactoryFn<T> = Arc<dyn Fn() -> Result<T, BoxError> + Send + Sync>;
pub(crate) type CloseFn<T> = Arc<dyn Fn(T) -> Result<(), BoxError> + Send + Sync>;
pub(crate) type PingFn<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// The plain, file-loadable part of a pool configuration.
///
/// Timeouts are expressed in milliseconds; `0` disables idle eviction and
/// makes an exhausted pool fail fast instead of waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolSettings {
    pub initial_cap: usize,
    pub max_cap: usize,
    pub max_idle: usize,
    pub idle_timeout_ms: u64,
    pub wait_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_cap: 0,
            max_cap: 10,
            max_idle: 10,
            idle_timeout_ms: 0,
            wait_timeout_ms: 0,
        }
    }
}

/// Configuration for pool capacity, timeouts and resource callbacks
///
/// # Examples
///
/// ```
/// use connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<u32>::new()
///     .with_factory(|| Ok(7))
///     .with_close(|_| Ok(()))
///     .with_max_cap(8)
///     .with_max_idle(4)
///     .with_wait_timeout(Duration::from_millis(250));
///
/// assert_eq!(config.max_cap, 8);
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfiguration<T> {
    /// Resources created eagerly when the pool is built
    pub initial_cap: usize,

    /// Upper bound on live resources (idle + checked out)
    pub max_cap: usize,

    /// Capacity of the idle store
    pub max_idle: usize,

    /// Idle resources older than this are closed on acquisition; zero disables
    pub idle_timeout: Duration,

    /// How long `get` waits on an exhausted pool; zero fails fast
    pub wait_timeout: Duration,

    pub(crate) factory: Option<FactoryFn<T>>,
    pub(crate) close: Option<CloseFn<T>>,
    pub(crate) ping: Option<PingFn<T>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self::from_settings(PoolSettings::default())
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            initial_cap: self.initial_cap,
            max_cap: self.max_cap,
            max_idle: self.max_idle,
            idle_timeout: self.idle_timeout,
            wait_timeout: self.wait_timeout,
            factory: self.factory.clone(),
            close: self.close.clone(),
            ping: self.ping.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("initial_cap", &self.initial_cap)
            .field("max_cap", &self.max_cap)
            .field("max_idle", &self.max_idle)
            .field("idle_timeout", &self.idle_timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("factory", &self.factory.is_some())
            .field("close", &self.close.is_some())
            .field("ping", &self.ping.is_some())
            .finish()
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from loaded settings, without callbacks
    pub fn from_settings(settings: PoolSettings) -> Self {
        Self {
            initial_cap: settings.initial_cap,
            max_cap: settings.max_cap,
            max_idle: settings.max_idle,
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            wait_timeout: Duration::from_millis(settings.wait_timeout_ms),
            factory: None,
            close: None,
            ping: None,
        }
    }

    /// Overwrite capacities and timeouts, keeping the callbacks already set
    pub fn with_settings(self, settings: PoolSettings) -> Self {
        Self {
            factory: self.factory,
            close: self.close,
            ping: self.ping,
            ..Self::from_settings(settings)
        }
    }

    /// Set the number of resources created eagerly
    pub fn with_initial_cap(mut self, count: usize) -> Self {
        self.initial_cap = count;
        self
    }

    /// Set the maximum number of live resources
    pub fn with_max_cap(mut self, count: usize) -> Self {
        self.max_cap = count;
        self
    }

    /// Set the idle store capacity
    pub fn with_max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the idle timeout; zero disables eviction
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set how long `get` waits on an exhausted pool; zero fails fast
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the constructor used for eager and on-demand creation
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set the destructor. It must tolerate half-broken resources.
    pub fn with_close<F>(mut self, close: F) -> Self
    where
        F: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.close = Some(Arc::new(close));
        self
    }

    /// Set a liveness probe, run on idle resources at acquisition time only
    pub fn with_ping<F>(mut self, ping: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.ping = Some(Arc::new(ping));
        self
    }

    /// Check the capacity invariant and the mandatory callbacks
    ///
    /// # Examples
    ///
    /// ```
    /// use connpool::{PoolConfiguration, PoolError};
    ///
    /// let config = PoolConfiguration::<u32>::new()
    ///     .with_factory(|| Ok(1))
    ///     .with_close(|_| Ok(()))
    ///     .with_initial_cap(5)
    ///     .with_max_idle(2);
    ///
    /// assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_cap == 0 {
            return Err(PoolError::Config("max_cap must be at least 1".to_string()));
        }
        if self.initial_cap > self.max_idle || self.max_idle > self.max_cap {
            return Err(PoolError::Config(format!(
                "capacities must satisfy initial_cap ({}) <= max_idle ({}) <= max_cap ({})",
                self.initial_cap, self.max_idle, self.max_cap
            )));
        }
        if self.factory.is_none() {
            return Err(PoolError::Config("factory callback is required".to_string()));
        }
        if self.close.is_none() {
            return Err(PoolError::Config("close callback is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PoolConfiguration<u32> {
        PoolConfiguration::new()
            .with_factory(|| Ok(1))
            .with_close(|_| Ok(()))
    }

    #[test]
    fn test_defaults_are_valid_once_callbacks_are_set() {
        let config = complete();
        assert_eq!(config.initial_cap, 0);
        assert_eq!(config.max_cap, 10);
        assert_eq!(config.max_idle, 10);
        assert!(config.wait_timeout.is_zero());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_callbacks_rejected() {
        let no_close = PoolConfiguration::<u32>::new().with_factory(|| Ok(1));
        assert!(matches!(no_close.validate(), Err(PoolError::Config(msg)) if msg.contains("close")));

        let no_factory = PoolConfiguration::<u32>::new().with_close(|_| Ok(()));
        assert!(matches!(no_factory.validate(), Err(PoolError::Config(msg)) if msg.contains("factory")));
    }

    #[test]
    fn test_capacity_invariant() {
        assert!(complete().with_max_idle(11).validate().is_err());
        assert!(complete().with_max_cap(0).with_max_idle(0).validate().is_err());
        assert!(complete().with_max_cap(1).with_max_idle(0).validate().is_ok());
        assert!(complete().with_initial_cap(3).with_max_idle(3).with_max_cap(3).validate().is_ok());
    }

    #[test]
    fn test_with_settings_keeps_callbacks() {
        let settings = PoolSettings {
            initial_cap: 1,
            max_cap: 4,
            max_idle: 2,
            idle_timeout_ms: 1_000,
            wait_timeout_ms: 50,
        };
        let config = complete().with_settings(settings);
        assert_eq!(config.max_cap, 4);
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
        assert_eq!(config.wait_timeout, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: PoolSettings =
            serde_json::from_str(r#"{"max_cap": 32, "wait_timeout_ms": 200}"#).unwrap();
        assert_eq!(settings.max_cap, 32);
        assert_eq!(settings.max_idle, 10);
        assert_eq!(settings.wait_timeout_ms, 200);
    }
}
