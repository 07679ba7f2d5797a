//! Knobs that are passed from adapter construction down to pool and
//! connection construction.
//!
//! Parsing a config file or CLI flags into these values is the client's job,
//! this struct only has to embed cleanly into its configuration.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::socket::Timeout;

/// Seconds before a request to the daemon times out.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
/// Number of distinct per-URL connection pools an adapter keeps alive.
pub const DEFAULT_NUM_POOLS: usize = 25;
/// Number of idle connections kept per pool.
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;

/// All settings that influence how an adapter manages its connections.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Socket timeout in seconds for connections created by the adapter.
    /// A value of `0` configures non-blocking sockets.
    ///
    /// Named pipes store this value without enforcing it on individual
    /// reads, see [Timeout] for the details.
    pub timeout: u64,
    /// Maximum number of distinct per-URL connection pools.
    /// Once exceeded, the least recently used pool is disposed.
    pub pool_connections: usize,
    /// Maximum number of idle connections kept per pool.
    pub max_pool_size: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        AdapterSettings {
            timeout: DEFAULT_TIMEOUT_SECONDS,
            pool_connections: DEFAULT_NUM_POOLS,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
        }
    }
}

impl AdapterSettings {
    /// The [Timeout] applied to sockets created on behalf of this adapter.
    pub fn request_timeout(&self) -> Timeout {
        match self.timeout {
            0 => Timeout::NonBlocking,
            seconds => Timeout::Limit(Duration::from_secs(seconds)),
        }
    }
}
