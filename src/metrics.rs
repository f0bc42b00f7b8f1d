//! Stats snapshots, lifetime counters and metrics export

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time view of the pool
///
/// Values are read without a common lock and may be slightly out of step
/// with a concurrently racing `get` or `put`.
///
/// # Examples
///
/// ```
/// use connpool::{Pool, PoolConfiguration};
///
/// let pool = Pool::new(
///     PoolConfiguration::new()
///         .with_factory(|| Ok(String::from("conn")))
///         .with_close(|_| Ok(()))
///         .with_initial_cap(2)
///         .with_max_idle(2),
/// )
/// .unwrap();
///
/// let stats = pool.stats();
/// assert_eq!(stats.active_count, 2);
/// assert_eq!(stats.idle_count, 2);
/// assert_eq!(stats.in_use_count(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    /// Live resources, idle and checked out
    pub active_count: usize,

    /// Resources sitting in the idle store
    pub idle_count: usize,
}

impl PoolStats {
    pub fn in_use_count(&self) -> usize {
        self.active_count.saturating_sub(self.idle_count)
    }
}

/// Lifetime counters plus the current stats
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    pub stats: PoolStats,

    pub max_capacity: usize,

    /// Live resources over `max_capacity` (0.0 to 1.0)
    pub utilization: f64,

    pub total_created: usize,
    pub total_closed: usize,
    pub total_acquired: usize,
    pub total_returned: usize,

    /// Returns delivered straight to a waiting `get`
    pub handoffs: usize,

    pub idle_evictions: usize,
    pub ping_failures: usize,

    /// `get` calls rejected without waiting
    pub exhausted_events: usize,

    pub wait_timeouts: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("active_count".to_string(), self.stats.active_count.to_string());
        metrics.insert("idle_count".to_string(), self.stats.idle_count.to_string());
        metrics.insert("in_use_count".to_string(), self.stats.in_use_count().to_string());
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("handoffs".to_string(), self.handoffs.to_string());
        metrics.insert("idle_evictions".to_string(), self.idle_evictions.to_string());
        metrics.insert("ping_failures".to_string(), self.ping_failures.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("wait_timeouts".to_string(), self.wait_timeouts.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use connpool::{MetricsExporter, Pool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::new(
    ///     PoolConfiguration::new()
    ///         .with_factory(|| Ok(0u8))
    ///         .with_close(|_| Ok(())),
    /// )
    /// .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "mysql".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "orders", Some(&tags));
    /// assert!(output.contains("connpool_resources_active"));
    /// assert!(output.contains("service=\"mysql\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("connpool_resources_active", "Live resources, idle and in use", metrics.stats.active_count as f64),
            ("connpool_resources_idle", "Idle resources", metrics.stats.idle_count as f64),
            ("connpool_resources_in_use", "Checked out resources", metrics.stats.in_use_count() as f64),
            ("connpool_utilization", "Live resources over capacity", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        let counters = [
            ("connpool_created_total", "Resources created", metrics.total_created),
            ("connpool_closed_total", "Resources closed", metrics.total_closed),
            ("connpool_acquired_total", "Successful acquisitions", metrics.total_acquired),
            ("connpool_returned_total", "Resources returned", metrics.total_returned),
            ("connpool_handoffs_total", "Returns handed to a waiter", metrics.handoffs),
            ("connpool_idle_evictions_total", "Idle resources evicted as stale", metrics.idle_evictions),
            ("connpool_ping_failures_total", "Failed health checks", metrics.ping_failures),
            ("connpool_exhausted_total", "Acquisitions rejected without waiting", metrics.exhausted_events),
            ("connpool_wait_timeouts_total", "Acquisitions that timed out waiting", metrics.wait_timeouts),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub acquired: AtomicUsize,
    pub returned: AtomicUsize,
    pub handoffs: AtomicUsize,
    pub idle_evictions: AtomicUsize,
    pub ping_failures: AtomicUsize,
    pub exhausted: AtomicUsize,
    pub wait_timeouts: AtomicUsize,
}

impl MetricsTracker {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, stats: PoolStats, max_capacity: usize) -> PoolMetrics {
        let utilization = if max_capacity > 0 {
            stats.active_count as f64 / max_capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            stats,
            max_capacity,
            utilization,
            total_created: self.created.load(Ordering::Relaxed),
            total_closed: self.closed.load(Ordering::Relaxed),
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_returned: self.returned.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
            ping_failures: self.ping_failures.load(Ordering::Relaxed),
            exhausted_events: self.exhausted.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(feature = "prometheus")]
pub use self::collector::PoolCollector;

#[cfg(feature = "prometheus")]
mod collector {
    use prometheus::core::{Collector, Desc};
    use prometheus::proto::MetricFamily;
    use prometheus::{IntGauge, Opts};

    use crate::pool::Pool;

    /// Registers a pool's live gauges with a `prometheus::Registry`
    ///
    /// Values are refreshed from [`Pool::stats`] on every scrape.
    pub struct PoolCollector<T: Send + 'static> {
        pool: Pool<T>,
        active: IntGauge,
        idle: IntGauge,
        in_use: IntGauge,
    }

    impl<T: Send + 'static> PoolCollector<T> {
        pub fn new(pool: Pool<T>, pool_name: &str) -> prometheus::Result<Self> {
            let gauge = |name: &str, help: &str| {
                IntGauge::with_opts(Opts::new(name, help).const_label("pool", pool_name))
            };
            Ok(Self {
                pool,
                active: gauge("connpool_resources_active", "Live resources, idle and in use")?,
                idle: gauge("connpool_resources_idle", "Idle resources")?,
                in_use: gauge("connpool_resources_in_use", "Checked out resources")?,
            })
        }
    }

    impl<T: Send + 'static> Collector for PoolCollector<T> {
        fn desc(&self) -> Vec<&Desc> {
            let mut descs = self.active.desc();
            descs.extend(self.idle.desc());
            descs.extend(self.in_use.desc());
            descs
        }

        fn collect(&self) -> Vec<MetricFamily> {
            let stats = self.pool.stats();
            self.active.set(stats.active_count as i64);
            self.idle.set(stats.idle_count as i64);
            self.in_use.set(stats.in_use_count() as i64);

            let mut families = self.active.collect();
            families.extend(self.idle.collect());
            families.extend(self.in_use.collect());
            families
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_utilization() {
        let tracker = MetricsTracker::default();
        MetricsTracker::incr(&tracker.created);
        MetricsTracker::incr(&tracker.created);
        MetricsTracker::incr(&tracker.handoffs);

        let stats = PoolStats { active_count: 2, idle_count: 1 };
        let metrics = tracker.snapshot(stats, 4);
        assert_eq!(metrics.total_created, 2);
        assert_eq!(metrics.handoffs, 1);
        assert_eq!(metrics.stats.in_use_count(), 1);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);

        let exported = metrics.export();
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.50"));
        assert_eq!(exported.get("in_use_count").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_prometheus_labels_are_stable() {
        let metrics = MetricsTracker::default().snapshot(PoolStats::default(), 1);
        let mut tags = HashMap::new();
        tags.insert("zone".to_string(), "b".to_string());
        tags.insert("env".to_string(), "prod".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "cache", Some(&tags));
        assert!(output.contains("connpool_resources_idle{pool=\"cache\",env=\"prod\",zone=\"b\"} 0"));
        assert!(output.contains("# TYPE connpool_wait_timeouts_total counter"));
    }
}
