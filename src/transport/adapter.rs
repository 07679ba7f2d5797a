//! The transport adapter: the piece the HTTP layer asks for connections.
//!
//! A standard HTTP stack establishes TCP connections itself. To make it
//! speak to a daemon on a local IPC endpoint instead, it is handed one of
//! these adapters, which answer `get_connection` with a pooled connection
//! over a Unix socket or named pipe.
use std::sync::Arc;

use crate::settings::AdapterSettings;
use crate::transport::conn::ConnectTarget;
use crate::transport::pool::{ConnectionPool, PoolRegistry};
use crate::transport::socket::Timeout;
#[cfg(unix)]
use std::path::PathBuf;

/// The URL scheme under which the daemon's Unix socket is configured,
/// e.g. `http+unix:///var/run/stevedore.sock`.
pub const UNIX_SOCKET_SCHEME: &str = "http+unix://";

/// Hands out pooled IPC connections for logical request URLs.
pub struct TransportAdapter {
    target: ConnectTarget,
    timeout: Timeout,
    max_pool_size: usize,
    pools: PoolRegistry,
}

impl TransportAdapter {
    /// An adapter connecting through the Unix socket in `socket_url`.
    ///
    /// The socket path is everything after the `http+unix://` scheme,
    /// forced to be absolute.
    #[cfg(unix)]
    pub fn unix(socket_url: &str, settings: &AdapterSettings) -> Self {
        let socket_path = parse_unix_socket_url(socket_url);

        Self::new(ConnectTarget::UnixSocket(socket_path), settings)
    }

    /// An adapter connecting through a named pipe,
    /// e.g. `\\.\pipe\stevedore_engine`. The address is used as-is.
    pub fn npipe(address: &str, settings: &AdapterSettings) -> Self {
        Self::new(ConnectTarget::NamedPipe(address.to_string()), settings)
    }

    fn new(target: ConnectTarget, settings: &AdapterSettings) -> Self {
        TransportAdapter {
            target,
            timeout: settings.request_timeout(),
            max_pool_size: settings.max_pool_size,
            pools: PoolRegistry::new(settings.pool_connections),
        }
    }

    /// The connection pool for a logical URL.
    ///
    /// The registry guarantees one pool per URL even under concurrent
    /// callers and evicts the least recently used pool when its capacity
    /// is exceeded.
    pub fn get_connection(&self, url: &str) -> Arc<ConnectionPool> {
        self.pools.get_or_create(url, || {
            ConnectionPool::new(url, self.target.clone(), self.timeout, self.max_pool_size)
        })
    }

    /// The URL a request should be issued against: path and query only.
    ///
    /// Proxy selection is meaningless for a local IPC endpoint and URL
    /// handling chokes on the missing hostname, so requests are issued
    /// against the bare path.
    pub fn request_url(&self, url: &str) -> String {
        path_url(url)
    }

    /// Dispose all pools.
    pub fn close(&self) {
        self.pools.clear();
    }
}

/// Recover the filesystem path from a `http+unix://` socket URL.
#[cfg(unix)]
fn parse_unix_socket_url(socket_url: &str) -> PathBuf {
    let path = socket_url
        .strip_prefix(UNIX_SOCKET_SCHEME)
        .unwrap_or(socket_url);

    if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        PathBuf::from(format!("/{path}"))
    }
}

/// Strip scheme and authority off a URL, keeping path and query.
fn path_url(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(index) => &url[index + 3..],
        None => url,
    };

    match without_scheme.find('/') {
        Some(index) => without_scheme[index..].to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_url_parsing() {
        assert_eq!(
            parse_unix_socket_url("http+unix:///var/run/stevedore.sock"),
            PathBuf::from("/var/run/stevedore.sock")
        );
        // A relative path is forced to be absolute.
        assert_eq!(
            parse_unix_socket_url("http+unix://var/run/stevedore.sock"),
            PathBuf::from("/var/run/stevedore.sock")
        );
        // A bare path works as well.
        assert_eq!(
            parse_unix_socket_url("/var/run/stevedore.sock"),
            PathBuf::from("/var/run/stevedore.sock")
        );
    }

    #[test]
    fn test_request_url_is_path_only() {
        let adapter = TransportAdapter::npipe(r"\\.\pipe\test", &AdapterSettings::default());

        assert_eq!(
            adapter.request_url("http+unix://localhost/v1.41/containers/json?all=1"),
            "/v1.41/containers/json?all=1"
        );
        assert_eq!(adapter.request_url("http+unix://localhost"), "/");
    }

    #[test]
    fn test_get_connection_reuses_pools() {
        let adapter = TransportAdapter::npipe(r"\\.\pipe\test", &AdapterSettings::default());

        let pool_a = adapter.get_connection("http+unix://localhost");
        let pool_b = adapter.get_connection("http+unix://localhost");
        let pool_other = adapter.get_connection("http+unix://other");

        assert!(Arc::ptr_eq(&pool_a, &pool_b));
        assert!(!Arc::ptr_eq(&pool_a, &pool_other));
    }

    #[test]
    fn test_close_disposes_pools() {
        let adapter = TransportAdapter::npipe(r"\\.\pipe\test", &AdapterSettings::default());

        let pool = adapter.get_connection("http+unix://localhost");
        adapter.close();

        assert!(pool.is_closed());
    }
}
