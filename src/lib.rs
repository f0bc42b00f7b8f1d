//! # connpool
//!
//! Bounded, thread-safe pool for expensive reusable resources such as
//! database sockets or RPC channels.
//!
//! ## Features
//!
//! - Caps live resources at `max_cap`, keeps up to `max_idle` of them idle
//! - Eager creation of `initial_cap` resources, all-or-nothing
//! - Idle-timeout eviction and optional health check on acquisition
//! - Waiters receive returned resources directly, bounded by a wait timeout
//! - Automatic return of resources via RAII (Drop trait)
//! - Async acquisition on tokio's blocking pool
//! - Stats, metrics and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use connpool::{Pool, PoolConfiguration};
//! use std::time::Duration;
//!
//! let pool = Pool::new(
//!     PoolConfiguration::new()
//!         .with_factory(|| Ok(String::from("connection")))
//!         .with_close(|_conn| Ok(()))
//!         .with_max_cap(4)
//!         .with_max_idle(2)
//!         .with_idle_timeout(Duration::from_secs(60))
//!         .with_wait_timeout(Duration::from_millis(500)),
//! )
//! .unwrap();
//!
//! {
//!     let conn = pool.get().unwrap();
//!     println!("Got: {}", *conn);
//!     // Resource automatically returned when `conn` goes out of scope
//! }
//!
//! assert_eq!(pool.stats().idle_count, 1);
//! ```

mod config;
mod errors;
mod eviction;
mod health;
mod metrics;
mod pool;

pub use config::{PoolConfiguration, PoolSettings};
pub use errors::{BoxError, PoolError, PoolResult, SharedError};
pub use eviction::EvictionPolicy;
pub use health::HealthStatus;
#[cfg(feature = "prometheus")]
pub use metrics::PoolCollector;
pub use metrics::{MetricsExporter, PoolMetrics, PoolStats};
pub use pool::{Pool, Pooled};
