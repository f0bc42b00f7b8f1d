//! Core resource pool implementation

use crate::config::{CloseFn, FactoryFn, PingFn, PoolConfiguration};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, IdleEntry, IdleStore};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics, PoolStats};

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A checked-out resource that goes back to the pool when dropped
pub struct Pooled<T> {
    resource: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Pooled<T> {
    fn new(resource: T, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            resource: Some(resource),
            pool,
        }
    }

    /// Close the resource instead of returning it, e.g. after an I/O error
    pub fn close(mut self) -> PoolResult<()> {
        match self.resource.take() {
            Some(resource) => self.pool.close_resource(resource),
            None => Ok(()),
        }
    }

    /// Take the raw resource out of the guard.
    ///
    /// It still counts against the pool's capacity and must be handed back
    /// exactly once with [`Pool::put`] or [`Pool::close`].
    pub fn into_inner(mut self) -> T {
        self.resource.take().expect("Resource already taken")
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.resource.as_ref().expect("Resource already taken")
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource.as_mut().expect("Resource already taken")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Err(err) = self.pool.put(resource) {
                debug!(error = %err, "pooled resource was not returned");
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("resource", &self.resource)
            .finish()
    }
}

/// Bounded pool of expensive, reusable resources
///
/// The handle is cheap to clone; clones share the same pool.
///
/// # Examples
///
/// ```
/// use connpool::{Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// let pool = Pool::new(
///     PoolConfiguration::new()
///         .with_factory(|| Ok(Vec::<u8>::with_capacity(64)))
///         .with_close(|_| Ok(()))
///         .with_max_cap(2)
///         .with_max_idle(2)
///         .with_wait_timeout(Duration::from_millis(100)),
/// )
/// .unwrap();
///
/// {
///     let mut buf = pool.get().unwrap();
///     buf.push(1);
///     // returned to the pool here
/// }
///
/// assert_eq!(pool.stats().idle_count, 1);
/// pool.release();
/// assert!(pool.get().is_err());
/// ```
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("stats", &self.inner.stats())
            .field("max_cap", &self.inner.max_cap)
            .field("released", &self.inner.is_released())
            .finish()
    }
}

impl<T> Pool<T> {
    /// Build a pool and eagerly create `initial_cap` resources.
    ///
    /// If any eager creation fails, everything created so far is closed and
    /// the factory error is returned.
    pub fn new(config: PoolConfiguration<T>) -> PoolResult<Self> {
        config.validate()?;
        let (Some(factory), Some(close)) = (config.factory, config.close) else {
            return Err(PoolError::Config("factory and close callbacks are required".to_string()));
        };

        let store = Arc::new(IdleStore::new(config.max_idle));
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let inner = Arc::new(PoolInner {
            idle: RwLock::new(Some(Arc::clone(&store))),
            live: AtomicUsize::new(0),
            waiters: DashMap::new(),
            next_waiter: AtomicU64::new(0),
            released: AtomicBool::new(false),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            factory,
            close,
            ping: config.ping,
            max_cap: config.max_cap,
            eviction: EvictionPolicy::from_idle_timeout(config.idle_timeout),
            wait_timeout: config.wait_timeout,
            metrics: MetricsTracker::default(),
        });

        for created in 0..config.initial_cap {
            inner.live.fetch_add(1, Ordering::SeqCst);
            match inner.create() {
                Ok(resource) => {
                    if let Err(entry) = store.push(IdleEntry::new(resource)) {
                        inner.discard(entry.resource, "idle store full");
                    }
                }
                Err(err) => {
                    warn!(created, error = %err, "initial resource creation failed");
                    inner.release();
                    return Err(err);
                }
            }
        }

        debug!(
            initial_cap = config.initial_cap,
            max_cap = config.max_cap,
            max_idle = config.max_idle,
            idle_timeout = ?config.idle_timeout,
            wait_timeout = ?config.wait_timeout,
            "created resource pool"
        );

        Ok(Self { inner })
    }

    /// Acquire a resource, waiting up to the configured wait timeout when the
    /// pool is saturated.
    ///
    /// Fails with [`PoolError::PoolExhausted`] when waiting is disabled,
    /// [`PoolError::WaitTimeout`] when the wait ran out, and
    /// [`PoolError::PoolClosed`] once the pool is released.
    pub fn get(&self) -> PoolResult<Pooled<T>> {
        let resource = self.inner.acquire()?;
        MetricsTracker::incr(&self.inner.metrics.acquired);
        Ok(Pooled::new(resource, Arc::clone(&self.inner)))
    }

    /// Acquire a resource from async code without blocking the runtime
    pub async fn get_async(&self) -> PoolResult<Pooled<T>>
    where
        T: Send + 'static,
    {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Return a resource obtained through [`Pooled::into_inner`]
    pub fn put(&self, resource: T) -> PoolResult<()> {
        self.inner.put(resource)
    }

    /// Close a resource instead of returning it
    pub fn close(&self, resource: T) -> PoolResult<()> {
        self.inner.close_resource(resource)
    }

    /// Run the configured health check; passes when none is configured
    pub fn ping(&self, resource: &T) -> PoolResult<()> {
        match &self.inner.ping {
            Some(ping) => ping(resource).map_err(PoolError::health_check),
            None => Ok(()),
        }
    }

    /// Shut the pool down and close every idle resource. Idempotent.
    ///
    /// Waiting `get` calls fail with [`PoolError::PoolClosed`]; resources still
    /// checked out are closed when they come back.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Whether `release` has run
    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// Number of idle resources
    pub fn len(&self) -> usize {
        self.inner.stats().idle_count
    }

    /// Whether no resource is idle
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound on live resources
    pub fn max_cap(&self) -> usize {
        self.inner.max_cap
    }

    /// Best-effort snapshot of live and idle counts
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// Stats plus lifetime counters
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics.snapshot(self.inner.stats(), self.inner.max_cap)
    }

    /// Health summary derived from the current stats
    pub fn health(&self) -> HealthStatus {
        HealthStatus::new(self.inner.stats(), self.inner.max_cap, self.inner.is_released())
    }
}

struct PoolInner<T> {
    /// `None` once released
    idle: RwLock<Option<Arc<IdleStore<T>>>>,
    live: AtomicUsize,
    /// Pending `get` calls, each with its own single-slot mailbox
    waiters: DashMap<u64, Sender<IdleEntry<T>>>,
    next_waiter: AtomicU64,
    released: AtomicBool,
    /// Dropped on release, which disconnects `shutdown_rx` for every waiter.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    factory: FactoryFn<T>,
    close: CloseFn<T>,
    ping: Option<PingFn<T>>,
    max_cap: usize,
    eviction: EvictionPolicy,
    wait_timeout: Duration,
    metrics: MetricsTracker,
}

impl<T> PoolInner<T> {
    fn store(&self) -> Option<Arc<IdleStore<T>>> {
        self.idle.read().clone()
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            active_count: self.live.load(Ordering::SeqCst),
            idle_count: self.store().map_or(0, |store| store.len()),
        }
    }

    fn acquire(&self) -> PoolResult<T> {
        loop {
            let store = self.store().ok_or(PoolError::PoolClosed)?;

            if let Some(entry) = store.pop() {
                match self.vet(entry, true) {
                    Some(resource) => return Ok(resource),
                    None => continue,
                }
            }

            if self.reserve() {
                return self.create();
            }

            if self.wait_timeout.is_zero() {
                MetricsTracker::incr(&self.metrics.exhausted);
                debug!(max_cap = self.max_cap, "pool exhausted");
                return Err(PoolError::PoolExhausted);
            }

            if let Some(resource) = self.wait(&store)? {
                return Ok(resource);
            }
        }
    }

    /// Park as a waiter until a hand-off, the wait timeout, or release.
    ///
    /// `Ok(None)` means the delivered resource was stale and the caller
    /// should go around again.
    fn wait(&self, store: &IdleStore<T>) -> PoolResult<Option<T>> {
        let (tx, rx) = channel::bounded(1);
        let key = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.waiters.insert(key, tx);

        // A return or close may have landed between the checks in `acquire`
        // and the registration above.
        if let Some(entry) = store.pop() {
            if self.withdraw(key) {
                return Ok(self.vet(entry, true));
            }
            // A releaser already claimed this waiter; its resource is in flight
            // and is picked up by the select below.
            let _ = self.put_entry(entry);
        } else if self.reserve() {
            if self.withdraw(key) {
                return self.create().map(Some);
            }
            self.unreserve();
        }

        let shutdown = &self.shutdown_rx;
        channel::select! {
            recv(rx) -> handed => match handed {
                Ok(entry) => Ok(self.vet(entry, false)),
                Err(_) => Err(PoolError::PoolClosed),
            },
            recv(shutdown) -> _ => {
                self.abandon(key, &rx, true);
                Err(PoolError::PoolClosed)
            },
            default(self.wait_timeout) => {
                self.abandon(key, &rx, false);
                MetricsTracker::incr(&self.metrics.wait_timeouts);
                warn!(timeout = ?self.wait_timeout, max_cap = self.max_cap, "timed out waiting for a resource");
                Err(PoolError::WaitTimeout(self.wait_timeout))
            },
        }
    }

    /// Give up a waiter registration.
    ///
    /// If a releaser already claimed the waiter, its resource is in flight:
    /// receive it and close it when the pool is shutting down, otherwise put
    /// it back in circulation.
    fn abandon(&self, key: u64, mailbox: &Receiver<IdleEntry<T>>, closing: bool) {
        if self.withdraw(key) {
            return;
        }
        if let Ok(entry) = mailbox.recv() {
            if closing {
                self.discard(entry.resource, "pool released");
            } else {
                let _ = self.put_entry(entry);
            }
        }
    }

    /// Deregister a waiter; `false` means a releaser got to it first.
    fn withdraw(&self, key: u64) -> bool {
        self.waiters.remove(&key).is_some()
    }

    fn next_waiter_key(&self) -> Option<u64> {
        self.waiters.iter().next().map(|waiter| *waiter.key())
    }

    /// Check an idle entry before handing it out, closing it if unusable.
    fn vet(&self, entry: IdleEntry<T>, probe: bool) -> Option<T> {
        if self.eviction.is_stale(entry.returned_at) {
            MetricsTracker::incr(&self.metrics.idle_evictions);
            trace!(idle_for = ?entry.returned_at.elapsed(), "evicting stale idle resource");
            self.discard(entry.resource, "idle timeout");
            return None;
        }

        if probe {
            if let Some(ping) = &self.ping {
                if let Err(err) = ping(&entry.resource) {
                    MetricsTracker::incr(&self.metrics.ping_failures);
                    debug!(error = %err, "idle resource failed health check");
                    self.discard(entry.resource, "health check failed");
                    return None;
                }
            }
        }

        Some(entry.resource)
    }

    /// Claim one unit of capacity ahead of construction.
    fn reserve(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.max_cap).then_some(live + 1)
            })
            .is_ok()
    }

    fn unreserve(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Drop one unit from the live count; `false` if nothing is live.
    fn forget(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| live.checked_sub(1))
            .is_ok()
    }

    /// Run the factory under a reservation already taken by the caller.
    fn create(&self) -> PoolResult<T> {
        match (self.factory)() {
            Ok(resource) => {
                MetricsTracker::incr(&self.metrics.created);
                trace!(live = self.live.load(Ordering::Relaxed), "created resource");
                Ok(resource)
            }
            Err(err) => {
                self.unreserve();
                debug!(error = %err, "resource factory failed");
                Err(PoolError::factory(err))
            }
        }
    }

    fn put(&self, resource: T) -> PoolResult<()> {
        if !self.is_released() && self.live.load(Ordering::SeqCst) == 0 {
            return Err(PoolError::InvalidResource);
        }
        MetricsTracker::incr(&self.metrics.returned);
        self.put_entry(IdleEntry::new(resource))
    }

    /// Hand the entry to a waiter, else store it idle, else close it.
    fn put_entry(&self, entry: IdleEntry<T>) -> PoolResult<()> {
        let Some(store) = self.store() else {
            self.discard(entry.resource, "pool released");
            return Err(PoolError::PoolClosed);
        };
        self.dispatch(&store, entry);
        Ok(())
    }

    fn dispatch(&self, store: &IdleStore<T>, mut entry: IdleEntry<T>) {
        loop {
            while let Some(key) = self.next_waiter_key() {
                let Some((_, mailbox)) = self.waiters.remove(&key) else {
                    continue;
                };
                match mailbox.send(entry) {
                    Ok(()) => {
                        MetricsTracker::incr(&self.metrics.handoffs);
                        trace!(waiter = key, "handed resource to waiter");
                        return;
                    }
                    Err(err) => entry = err.into_inner(),
                }
            }

            if let Err(entry) = store.push(entry) {
                self.discard(entry.resource, "idle store full");
                return;
            }

            // Release may already have drained the store this entry landed in.
            if self.is_released() {
                self.drain(store);
                return;
            }

            // A waiter that registered after the scan above may have re-checked
            // the store before the push; take an entry back out and serve it.
            if self.waiters.is_empty() {
                return;
            }
            match store.pop() {
                Some(next) => entry = next,
                None => return,
            }
        }
    }

    fn close_resource(&self, resource: T) -> PoolResult<()> {
        if !self.forget() {
            return Err(PoolError::InvalidResource);
        }
        MetricsTracker::incr(&self.metrics.closed);
        (self.close)(resource).map_err(PoolError::close_failed)
    }

    /// Close a resource the pool is throwing away. Failures are only logged.
    fn discard(&self, resource: T, reason: &'static str) {
        self.forget();
        MetricsTracker::incr(&self.metrics.closed);
        if let Err(err) = (self.close)(resource) {
            warn!(reason, error = %err, "failed to close discarded resource");
        }
    }

    fn drain(&self, store: &IdleStore<T>) -> usize {
        let mut drained = 0;
        while let Some(entry) = store.pop() {
            self.discard(entry.resource, "pool released");
            drained += 1;
        }
        drained
    }

    fn release(&self) {
        let store = {
            let mut idle = self.idle.write();
            let Some(store) = idle.take() else {
                return;
            };
            self.released.store(true, Ordering::SeqCst);
            store
        };

        drop(self.shutdown_tx.lock().take());
        let drained = self.drain(&store);
        debug!(
            drained,
            live = self.live.load(Ordering::SeqCst),
            "released resource pool"
        );
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        self.release();
    }
}
