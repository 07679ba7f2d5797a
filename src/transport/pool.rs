//! Connection pooling.
//!
//! A [ConnectionPool] keeps idle connections for a single URL around so
//! consecutive requests reuse their socket. The [PoolRegistry] maps URLs to
//! their pools, bounded in size: once too many distinct URLs were seen, the
//! pool that wasn't used for the longest time is disposed. The registry is
//! owned by the adapter instance, there is no process-global state.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::internal_prelude::*;
use crate::transport::conn::{ConnectTarget, DaemonConnection};
use crate::transport::socket::Timeout;

/// A bounded pool of connections to a single URL.
///
/// Pools hand out one connection at a time and are not designed for
/// concurrent use of a single connection, consistent with HTTP/1.1
/// request/response usage.
pub struct ConnectionPool {
    base_url: String,
    target: ConnectTarget,
    timeout: Timeout,
    /// Upper bound for the number of *idle* connections kept around.
    max_size: usize,
    idle: Mutex<Vec<DaemonConnection>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(
        base_url: impl Into<String>,
        target: ConnectTarget,
        timeout: Timeout,
        max_size: usize,
    ) -> Self {
        ConnectionPool {
            base_url: base_url.into(),
            target,
            timeout,
            max_size,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Check out a connection, reusing an idle one when possible.
    /// New connections are created unconnected and connect lazily.
    pub fn get(&self) -> DaemonConnection {
        if let Some(connection) = self.idle.lock().unwrap().pop() {
            return connection;
        }

        DaemonConnection::new(self.base_url.clone(), self.target.clone(), self.timeout)
    }

    /// Return a connection to the pool.
    ///
    /// Connections are dropped instead of pooled when the pool is full or
    /// already closed. Upgraded connections are always dropped: their
    /// stream was handed over to the attach protocol and no longer speaks
    /// request/response.
    pub fn put(&self, mut connection: DaemonConnection) {
        if self.closed.load(Ordering::SeqCst) || connection.disable_buffering() {
            connection.close();
            return;
        }

        let mut idle = self.idle.lock().unwrap();
        if idle.len() >= self.max_size {
            drop(idle);
            connection.close();
            return;
        }

        idle.push(connection);
    }

    /// Close all idle connections and refuse new ones. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut idle = self.idle.lock().unwrap();
        for mut connection in idle.drain(..) {
            connection.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of idle connections currently pooled.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// What to do with a pool that falls out of the registry.
type DisposeFn = Box<dyn Fn(&ConnectionPool) + Send + Sync>;

/// A thread-safe, bounded URL → pool map with least-recently-used eviction.
pub struct PoolRegistry {
    capacity: usize,
    inner: Mutex<RegistryInner>,
    dispose: DisposeFn,
}

struct RegistryInner {
    /// Monotonic access counter, bumped on every registry operation.
    /// Entries remember the counter value of their last use.
    tick: u64,
    pools: HashMap<String, RegistryEntry>,
}

struct RegistryEntry {
    pool: Arc<ConnectionPool>,
    last_used: u64,
}

impl PoolRegistry {
    /// A registry that closes evicted pools.
    pub fn new(capacity: usize) -> Self {
        Self::with_dispose(capacity, Box::new(|pool| pool.close()))
    }

    /// A registry with a custom disposal callback.
    /// The callback runs exactly once per evicted pool.
    pub fn with_dispose(capacity: usize, dispose: DisposeFn) -> Self {
        PoolRegistry {
            capacity,
            inner: Mutex::new(RegistryInner {
                tick: 0,
                pools: HashMap::new(),
            }),
            dispose,
        }
    }

    /// Look a pool up, creating it when absent.
    ///
    /// Check-then-insert happens under one lock, so concurrent callers for
    /// the same URL all end up with the one pool that was actually created.
    pub fn get_or_create<F>(&self, url: &str, create: F) -> Arc<ConnectionPool>
    where
        F: FnOnce() -> ConnectionPool,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(entry) = inner.pools.get_mut(url) {
            entry.last_used = tick;
            return Arc::clone(&entry.pool);
        }

        let pool = Arc::new(create());
        inner.pools.insert(
            url.to_string(),
            RegistryEntry {
                pool: Arc::clone(&pool),
                last_used: tick,
            },
        );

        while inner.pools.len() > self.capacity {
            let oldest = inner
                .pools
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(url, _)| url.clone());
            let Some(oldest) = oldest else { break };

            if let Some(entry) = inner.pools.remove(&oldest) {
                debug!("Evicting connection pool for {oldest}");
                (self.dispose)(&entry.pool);
            }
        }

        pool
    }

    /// Dispose every pool and forget about it.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, entry) in inner.pools.drain() {
            (self.dispose)(&entry.pool);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().unwrap().pools.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
