//! Idle storage and the idle-timeout eviction policy

use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;

/// Eviction policy applied to idle resources when they are acquired
///
/// # Examples
///
/// ```
/// use connpool::EvictionPolicy;
/// use std::time::Duration;
///
/// assert_eq!(EvictionPolicy::from_idle_timeout(Duration::ZERO), EvictionPolicy::None);
/// assert_eq!(
///     EvictionPolicy::from_idle_timeout(Duration::from_secs(30)),
///     EvictionPolicy::IdleTimeout(Duration::from_secs(30)),
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Idle resources never go stale
    #[default]
    None,

    /// Resources idle for longer than the duration are closed instead of reused
    IdleTimeout(Duration),
}

impl EvictionPolicy {
    pub fn from_idle_timeout(timeout: Duration) -> Self {
        if timeout.is_zero() {
            EvictionPolicy::None
        } else {
            EvictionPolicy::IdleTimeout(timeout)
        }
    }

    pub(crate) fn is_stale(&self, returned_at: Instant) -> bool {
        match self {
            EvictionPolicy::None => false,
            EvictionPolicy::IdleTimeout(timeout) => returned_at.elapsed() > *timeout,
        }
    }
}

/// A resource that is not checked out, stamped with the time it came back.
#[derive(Debug)]
pub(crate) struct IdleEntry<T> {
    pub resource: T,
    pub returned_at: Instant,
}

impl<T> IdleEntry<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            returned_at: Instant::now(),
        }
    }
}

/// Bounded queue of idle resources. A zero capacity store retains nothing.
pub(crate) struct IdleStore<T> {
    queue: Option<ArrayQueue<IdleEntry<T>>>,
}

impl<T> IdleStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: (capacity > 0).then(|| ArrayQueue::new(capacity)),
        }
    }

    pub fn pop(&self) -> Option<IdleEntry<T>> {
        self.queue.as_ref()?.pop()
    }

    /// Hands the entry back when the store is full.
    pub fn push(&self, entry: IdleEntry<T>) -> Result<(), IdleEntry<T>> {
        match &self.queue {
            Some(queue) => queue.push(entry),
            None => Err(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_rejects_when_full() {
        let store = IdleStore::new(1);
        assert!(store.push(IdleEntry::new(1)).is_ok());
        let rejected = store.push(IdleEntry::new(2)).unwrap_err();
        assert_eq!(rejected.resource, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.pop().map(|e| e.resource), Some(1));
        assert!(store.pop().is_none());
    }

    #[test]
    fn test_zero_capacity_store_retains_nothing() {
        let store = IdleStore::new(0);
        assert!(store.push(IdleEntry::new("conn")).is_err());
        assert_eq!(store.len(), 0);
        assert!(store.pop().is_none());
    }

    #[test]
    fn test_idle_timeout_staleness() {
        let policy = EvictionPolicy::IdleTimeout(Duration::from_millis(10));
        let long_ago = Instant::now() - Duration::from_millis(50);
        assert!(policy.is_stale(long_ago));
        assert!(!policy.is_stale(Instant::now()));
        assert!(!EvictionPolicy::None.is_stale(long_ago));
    }
}
