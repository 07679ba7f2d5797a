//! A client socket on top of Windows named pipes.
//!
//! The daemon on Windows listens on a named pipe instead of a Unix socket.
//! Named pipes don't speak the socket API though, so this module wraps the
//! raw pipe handle into a type that behaves like a stream socket: it
//! implements [Read], [Write] and [Stream] and can therefore be handed to
//! the connection pool and the attach stream decoder like any other
//! transport.
//!
//! Server-side operations (bind, listen, accept) are intentionally missing.
//! This is a client socket.
use std::io::{self, BufReader, Read, Write};
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::internal_prelude::*;
use crate::transport::socket::{Stream, Timeout};

pub mod win32;

use win32::{
    PipeHandle, Win32Error, ERROR_PIPE_BUSY, GENERIC_READ, GENERIC_WRITE, OPEN_EXISTING,
    SECURITY_ANONYMOUS, SECURITY_SQOS_PRESENT,
};

/// How often a connect is attempted while the pipe reports
/// [ERROR_PIPE_BUSY] before giving up.
pub const MAXIMUM_RETRY_COUNT: u32 = 10;
/// The fixed pause between two connect attempts. No backoff, no jitter.
pub const RETRY_WAIT: Duration = Duration::from_secs(1);

/// A socket-shaped client handle to a Windows named pipe.
///
/// The socket starts out unconnected, becomes connected via [connect]
/// and is dead for good once [close]d.
///
/// [connect]: NamedPipeSocket::connect
/// [close]: NamedPipeSocket::close
#[derive(Debug, Default)]
pub struct NamedPipeSocket {
    handle: Option<PipeHandle>,
    /// The pipe path this socket is connected to.
    address: Option<String>,
    /// Advisory only. Named pipe reads and writes block until they finish,
    /// the stored value is not enforced on individual calls.
    timeout: Timeout,
    /// The pipe flags reported by the OS at connect time.
    flags: u32,
    closed: bool,
}

impl NamedPipeSocket {
    /// Create a new, unconnected socket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing handle, e.g. when duplicating a socket.
    pub(crate) fn from_handle(handle: PipeHandle) -> Self {
        NamedPipeSocket {
            handle: Some(handle),
            address: None,
            timeout: Timeout::default(),
            flags: 0,
            closed: false,
        }
    }

    /// Connect to the named pipe at `address`, e.g. `\\.\pipe\stevedore_engine`.
    ///
    /// If all pipe instances are taken by other clients, the OS reports the
    /// pipe as busy. In that case the connect is retried every
    /// [RETRY_WAIT] for up to [MAXIMUM_RETRY_COUNT] attempts before the
    /// busy error is surfaced as a connection error. All other errors
    /// propagate immediately.
    pub fn connect(&mut self, address: &str) -> Result<(), Error> {
        self.ensure_usable()?;

        let handle = open_with_retry(
            || {
                win32::create_file(
                    address,
                    GENERIC_READ | GENERIC_WRITE,
                    0,
                    OPEN_EXISTING,
                    SECURITY_ANONYMOUS | SECURITY_SQOS_PRESENT,
                )
            },
            MAXIMUM_RETRY_COUNT,
            RETRY_WAIT,
        )
        .map_err(|err| {
            if err.code == ERROR_PIPE_BUSY {
                Error::Connection(format!(
                    "Named pipe {address} was still busy after {MAXIMUM_RETRY_COUNT} connection attempts."
                ))
            } else {
                Error::Win32(err)
            }
        })?;

        self.flags = win32::pipe_info(handle)?.flags;
        self.handle = Some(handle);
        self.address = Some(address.to_string());

        Ok(())
    }

    /// Create a second socket that shares this socket's handle.
    ///
    /// This is not a real OS-level handle duplication. Closing either
    /// socket invalidates the pipe for both.
    pub fn dup(&self) -> Result<NamedPipeSocket, Error> {
        self.ensure_usable()?;

        let mut socket = match self.handle {
            Some(handle) => NamedPipeSocket::from_handle(handle),
            None => NamedPipeSocket::new(),
        };
        socket.address = self.address.clone();
        socket.timeout = self.timeout;
        socket.flags = self.flags;

        Ok(socket)
    }

    /// A buffered, read-only view on this socket, for handing the response
    /// side of a connection to code that expects an [io::Read].
    ///
    /// This is the only file-like view a named pipe socket supports.
    /// Writing through it is unrepresentable.
    pub fn reader(&self) -> Result<BufReader<PipeReader>, Error> {
        Ok(BufReader::new(PipeReader {
            socket: self.dup()?,
        }))
    }

    /// Give up ownership of the handle without closing it.
    ///
    /// The socket counts as closed afterwards, it's the caller's job to
    /// close the returned handle eventually.
    pub fn detach(&mut self) -> Result<PipeHandle, Error> {
        self.ensure_usable()?;

        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::Connection("Socket is not connected.".to_string()))?;
        self.closed = true;

        Ok(handle)
    }

    /// The address this socket is connected to.
    pub fn peer_address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The advisory timeout value.
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// The pipe flags cached at connect time.
    pub fn pipe_flags(&self) -> u32 {
        self.flags
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the underlying handle. Once closed, the socket can't be used
    /// again. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Some(handle) = self.handle {
            win32::close_handle(handle);
        }
        self.closed = true;
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::SocketClosed);
        }

        Ok(())
    }

    /// The handle to run I/O against, with the closed/unconnected checks
    /// every operation has to perform.
    fn io_handle(&self) -> io::Result<PipeHandle> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                Error::SocketClosed.to_string(),
            ));
        }
        self.handle.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "Socket is not connected.")
        })
    }

    #[cfg(test)]
    fn handle(&self) -> Option<PipeHandle> {
        self.handle
    }
}

impl Read for NamedPipeSocket {
    /// Issue exactly one read request for up to `buffer.len()` bytes.
    ///
    /// There is no internal retry loop. Callers that need an exact number
    /// of bytes have to loop themselves, see
    /// [read_exactly](crate::transport::protocol::read_exactly).
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let handle = self.io_handle()?;
        win32::read_file(handle, buffer).map_err(io::Error::from)
    }
}

impl Write for NamedPipeSocket {
    /// Issue exactly one write request for the whole buffer.
    /// Named pipe writes are not partial in practice.
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        let handle = self.io_handle()?;
        win32::write_file(handle, buffer).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for NamedPipeSocket {
    /// Store the timeout. The value is advisory, see the field docs.
    fn set_timeout(&mut self, timeout: Timeout) -> Result<(), Error> {
        self.timeout = timeout;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.close();
        Ok(())
    }
}

impl Drop for NamedPipeSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// The read-only half used by [NamedPipeSocket::reader].
pub struct PipeReader {
    socket: NamedPipeSocket,
}

impl Read for PipeReader {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buffer)
    }
}

/// Run `open` until it succeeds, a non-busy error occurs or all `attempts`
/// are used up, sleeping `wait` between two attempts.
///
/// The opener is injected so the retry policy can be tested without an
/// actual pipe.
fn open_with_retry<F>(mut open: F, attempts: u32, wait: Duration) -> Result<PipeHandle, Win32Error>
where
    F: FnMut() -> Result<PipeHandle, Win32Error>,
{
    let mut attempt = 1;
    loop {
        match open() {
            Ok(handle) => return Ok(handle),
            Err(err) if err.code == ERROR_PIPE_BUSY && attempt < attempts => {
                // Another client grabbed our pipe instance before we got to
                // it. Wait for availability and attempt to connect again.
                debug!("Pipe is busy, waiting for attempt {}/{attempts}", attempt + 1);
                thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => {
                if err.code == ERROR_PIPE_BUSY {
                    warn!("Pipe was still busy after {attempts} connection attempts");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;

    use super::*;

    fn busy_error() -> Win32Error {
        Win32Error::new(ERROR_PIPE_BUSY, "CreateFileW", "Pipe is busy".to_string())
    }

    /// Nine busy responses followed by a success: the tenth attempt
    /// connects, nine waits happened in between.
    #[test]
    fn test_connect_succeeds_on_last_retry() {
        let attempts = Cell::new(0);
        let open = || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 10 {
                Err(busy_error())
            } else {
                Ok(PipeHandle(7))
            }
        };

        let handle = open_with_retry(open, MAXIMUM_RETRY_COUNT, Duration::ZERO);

        assert_eq!(handle.unwrap(), PipeHandle(7));
        assert_eq!(attempts.get(), 10);
    }

    /// Ten busy responses: the busy error surfaces after exactly ten
    /// attempts.
    #[test]
    fn test_connect_exhausts_retries_on_busy_pipe() {
        let attempts = Cell::new(0);
        let open = || {
            attempts.set(attempts.get() + 1);
            Err(busy_error())
        };

        let result = open_with_retry(open, MAXIMUM_RETRY_COUNT, Duration::ZERO);

        assert_eq!(result.unwrap_err().code, ERROR_PIPE_BUSY);
        assert_eq!(attempts.get(), 10);
    }

    /// Any non-busy error propagates without a single retry.
    #[test]
    fn test_connect_propagates_other_errors() {
        let attempts = Cell::new(0);
        let open = || {
            attempts.set(attempts.get() + 1);
            Err(Win32Error::new(
                2,
                "CreateFileW",
                "No such pipe".to_string(),
            ))
        };

        let result = open_with_retry(open, MAXIMUM_RETRY_COUNT, Duration::ZERO);

        assert_eq!(result.unwrap_err().code, 2);
        assert_eq!(attempts.get(), 1);
    }

    /// Using a closed socket is a programmer error and fails locally.
    #[test]
    fn test_closed_socket_can_not_be_reused() {
        let mut socket = NamedPipeSocket::from_handle(PipeHandle::NULL);
        socket.close();

        let mut buffer = [0u8; 4];
        assert_eq!(
            socket.read(&mut buffer).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(
            socket.write(b"data").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert!(matches!(socket.dup(), Err(Error::SocketClosed)));
        assert!(matches!(
            socket.connect(r"\\.\pipe\test"),
            Err(Error::SocketClosed)
        ));
    }

    /// Closing twice is fine.
    #[test]
    fn test_close_is_idempotent() {
        let mut socket = NamedPipeSocket::from_handle(PipeHandle::NULL);
        socket.close();
        socket.close();

        assert!(socket.is_closed());
    }

    /// An unconnected socket has no handle to read from.
    #[test]
    fn test_unconnected_socket_fails_reads() {
        let mut socket = NamedPipeSocket::new();

        let mut buffer = [0u8; 4];
        assert_eq!(
            socket.read(&mut buffer).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    /// `dup` shares the raw handle value instead of duplicating the OS
    /// handle.
    #[test]
    fn test_dup_shares_the_handle() {
        let socket = NamedPipeSocket::from_handle(PipeHandle(42));
        let duplicate = socket.dup().unwrap();

        assert_eq!(duplicate.handle(), Some(PipeHandle(42)));
    }

    /// The timeout is stored but never enforced on reads or writes.
    #[test]
    fn test_timeout_is_stored_advisory() {
        let mut socket = NamedPipeSocket::new();
        assert_eq!(socket.timeout(), Timeout::Blocking);

        socket
            .set_timeout(Timeout::Limit(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(socket.timeout(), Timeout::Limit(Duration::from_secs(5)));

        socket.set_timeout(Timeout::NonBlocking).unwrap();
        assert_eq!(socket.timeout(), Timeout::NonBlocking);
    }

    /// On platforms without the real bindings the reader sees an immediate
    /// EOF instead of an error.
    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_reader_reads_eof_through_the_stub() {
        let socket = NamedPipeSocket::from_handle(PipeHandle::NULL);
        let mut reader = socket.reader().unwrap();

        let mut buffer = Vec::new();
        let read_bytes = reader.read_to_end(&mut buffer).unwrap();

        assert_eq!(read_bytes, 0);
    }
}
