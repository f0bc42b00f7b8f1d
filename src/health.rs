//! Health reporting for resource pools

use crate::metrics::PoolStats;

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use connpool::{Pool, PoolConfiguration};
///
/// let pool = Pool::new(
///     PoolConfiguration::new()
///         .with_factory(|| Ok(0u8))
///         .with_close(|_| Ok(()))
///         .with_initial_cap(3)
///         .with_max_idle(3),
/// )
/// .unwrap();
///
/// let health = pool.health();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_resources, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    pub is_healthy: bool,

    /// Live resources over capacity (0.0 to 1.0)
    pub utilization: f64,

    pub active_resources: usize,
    pub idle_resources: usize,
    pub max_capacity: usize,

    /// Whether `release` has been called
    pub released: bool,

    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(stats: PoolStats, max_capacity: usize, released: bool) -> Self {
        let utilization = if max_capacity > 0 {
            stats.active_count as f64 / max_capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if released {
            warnings.push("Pool has been released".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        // Saturated with nothing idle: the next get has to wait or fail.
        if stats.idle_count == 0 && stats.active_count >= max_capacity && max_capacity > 0 {
            warnings.push("Pool is exhausted".to_string());
        }

        Self {
            is_healthy,
            utilization,
            active_resources: stats.active_count,
            idle_resources: stats.idle_count,
            max_capacity,
            released,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturated_pool_is_unhealthy() {
        let health = HealthStatus::new(PoolStats { active_count: 4, idle_count: 0 }, 4, false);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count(), 2);
    }

    #[test]
    fn test_released_pool_is_unhealthy() {
        let health = HealthStatus::new(PoolStats::default(), 4, true);
        assert!(!health.is_healthy());
        assert!(health.warnings[0].contains("released"));
    }

    #[test]
    fn test_light_load_is_healthy() {
        let health = HealthStatus::new(PoolStats { active_count: 2, idle_count: 1 }, 10, false);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count(), 0);
    }
}
