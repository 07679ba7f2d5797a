//! Socket handling is platform specific code.
//!
//! The submodules of this module represent the different implementations for
//! each supported platform.
//! Depending on the target, the respective platform is read and loaded into
//! this scope.
//!
//! Independent of the platform, this module defines the [Stream] trait, the
//! capability set every transport has to provide so the layers above can stay
//! generic over Unix sockets, named pipes and TLS encrypted TCP sockets.
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Shared socket logic
#[cfg_attr(not(target_os = "windows"), path = "unix.rs")]
#[cfg_attr(target_os = "windows", path = "windows.rs")]
mod platform;
pub use self::platform::*;

/// How long a socket operation may block.
///
/// This mirrors the three timeout modes of the classic socket API:
/// no timeout, a zero timeout and a positive timeout.
/// Sockets backed by a file descriptor enforce a [Timeout::Limit] on every
/// read and write. Named pipes only store the value with millisecond
/// granularity for a future wait-based implementation, the actual calls
/// block until data arrives or the peer closes the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Block until the operation finishes.
    #[default]
    Blocking,
    /// Don't wait at all.
    NonBlocking,
    /// Wait at most this long.
    Limit(Duration),
}

/// A new trait, which can be used to represent Unix sockets, named pipes and
/// Tls encrypted TcpStreams. \
/// This is necessary to write generic functions where all types can be used.
pub trait Stream: Read + Write + Send {
    /// Configure how long reads and writes on this socket may block.
    fn set_timeout(&mut self, timeout: Timeout) -> Result<(), Error>;

    /// Tear the connection down. Any further operation on the socket fails.
    fn shutdown(&mut self) -> Result<(), Error>;

    /// The raw file descriptor backing this socket, used for readiness
    /// polling. Transports that aren't backed by one, such as named pipes,
    /// return `None`.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// Convenience type, so we don't have to write `Box<dyn Stream>` all the time.
pub type GenericStream = Box<dyn Stream>;

/// The different ways a daemon can be reached, used by [get_client_stream].
///
/// Which variants exist depends on the platform the crate is built for.
#[derive(Clone, Debug)]
pub enum ConnectionSettings {
    /// Connect to a Unix domain socket at the given path.
    #[cfg(not(target_os = "windows"))]
    UnixSocket { path: PathBuf },
    /// Connect to a Windows named pipe, e.g. `\\.\pipe\stevedore_engine`.
    #[cfg(target_os = "windows")]
    NamedPipe { path: String },
    /// Connect via TCP with TLS on top.
    /// The certificate is the daemon's own (usually self-signed) certificate.
    TlsTcpSocket {
        host: String,
        port: u16,
        certificate: PathBuf,
    },
}
