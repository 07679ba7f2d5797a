//! A single logical HTTP connection to the daemon over one of the IPC
//! transports.
//!
//! The HTTP layer on top drives the connection through the
//! `put_request`/`put_header`/`end_headers` surface and reads the response
//! through [DaemonConnection::response_reader]. The connection itself never
//! interprets HTTP, with one exception: it watches the headers for a
//! `Connection: Upgrade` and disables response buffering for the rest of
//! its life in that case. Attach and exec streams are framed on the wire
//! and reading ahead of the decoder would swallow frames.
use std::fmt::Debug;
use std::io::{self, BufReader, Read, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::PathBuf;

use crate::error::Error;
use crate::internal_prelude::*;
use crate::transport::npipe::NamedPipeSocket;
use crate::transport::socket::{GenericStream, Stream, Timeout};

/// Where a connection's socket comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A Unix domain socket at the given filesystem path.
    #[cfg(unix)]
    UnixSocket(PathBuf),
    /// A Windows named pipe address, e.g. `\\.\pipe\stevedore_engine`.
    NamedPipe(String),
}

/// One lazily-connected HTTP connection over IPC.
pub struct DaemonConnection {
    base_url: String,
    target: ConnectTarget,
    timeout: Timeout,
    /// Set once an `Upgrade` value was put on the `Connection` header.
    /// From that point on the response is read without buffering.
    disable_buffering: bool,
    /// Request line and headers are collected here and written out in one
    /// go by [end_headers](Self::end_headers).
    header_buffer: Vec<u8>,
    stream: Option<GenericStream>,
}

impl Debug for DaemonConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConnection")
            .field("base_url", &self.base_url)
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("disable_buffering", &self.disable_buffering)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl DaemonConnection {
    pub fn new(base_url: impl Into<String>, target: ConnectTarget, timeout: Timeout) -> Self {
        DaemonConnection {
            base_url: base_url.into(),
            target,
            timeout,
            disable_buffering: false,
            header_buffer: Vec::new(),
            stream: None,
        }
    }

    /// Establish the underlying socket connection.
    ///
    /// Unix sockets get the stored timeout applied, named pipes store it
    /// as advisory state and retry while the pipe is busy.
    pub fn connect(&mut self) -> Result<(), Error> {
        let stream: GenericStream = match &self.target {
            #[cfg(unix)]
            ConnectTarget::UnixSocket(path) => {
                let stream = UnixStream::connect(path).map_err(|err| {
                    Error::IoPathError(path.clone(), "connecting to daemon. Is it running?", err)
                })?;

                let mut stream: GenericStream = Box::new(stream);
                stream.set_timeout(self.timeout)?;
                stream
            }
            ConnectTarget::NamedPipe(address) => {
                let mut socket = NamedPipeSocket::new();
                socket.set_timeout(self.timeout)?;
                socket.connect(address)?;

                Box::new(socket)
            }
        };

        debug!("Connected to daemon at {:?}", self.target);
        self.stream = Some(stream);

        Ok(())
    }

    /// Start a new request. Connects first if necessary.
    pub fn put_request(&mut self, method: &str, selector: &str) -> Result<(), Error> {
        if self.stream.is_none() {
            self.connect()?;
        }

        self.header_buffer.clear();
        self.header_buffer
            .extend_from_slice(format!("{method} {selector} HTTP/1.1\r\n").as_bytes());

        Ok(())
    }

    /// Add a header to the current request.
    ///
    /// An `Upgrade` value on the `Connection` header flips this connection
    /// into unbuffered response mode for good.
    pub fn put_header(&mut self, name: &str, values: &[&str]) {
        for value in values {
            self.header_buffer
                .extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }

        if name == "Connection" && values.iter().any(|value| value.contains("Upgrade")) {
            self.disable_buffering = true;
        }
    }

    /// Terminate the header block and flush everything to the socket.
    pub fn end_headers(&mut self) -> Result<(), Error> {
        self.header_buffer.extend_from_slice(b"\r\n");
        let buffer = std::mem::take(&mut self.header_buffer);

        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream
            .write_all(&buffer)
            .map_err(|err| Error::IoError("sending request headers".to_string(), err))?;
        stream.flush()?;

        Ok(())
    }

    /// The response side of the connection.
    ///
    /// Buffered by default. Once the connection was upgraded, reads go
    /// straight to the socket so the attach stream decoder sees every byte
    /// exactly when it arrives.
    pub fn response_reader(&mut self) -> Result<Box<dyn Read + Send + '_>, Error> {
        let disable_buffering = self.disable_buffering;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        if disable_buffering {
            Ok(Box::new(stream))
        } else {
            Ok(Box::new(BufReader::new(stream)))
        }
    }

    /// Raw access to the underlying stream, e.g. for
    /// [frames_iter](crate::transport::protocol::frames_iter).
    pub fn stream_mut(&mut self) -> Option<&mut GenericStream> {
        self.stream.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn disable_buffering(&self) -> bool {
        self.disable_buffering
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Tear the connection down.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown();
        }
    }
}

/// The request body path: bytes written to the connection go straight to
/// the socket.
impl Write for DaemonConnection {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(buffer),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "Connection is not established.",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }
}

fn not_connected() -> Error {
    Error::Connection("Connection is not established.".to_string())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn test_connection() -> DaemonConnection {
        DaemonConnection::new(
            "http+unix://localhost",
            ConnectTarget::NamedPipe(r"\\.\pipe\test".to_string()),
            Timeout::Blocking,
        )
    }

    #[test]
    fn test_upgrade_header_disables_buffering() {
        let mut connection = test_connection();
        assert!(!connection.disable_buffering());

        // Unrelated headers don't flip the flag, neither does an Upgrade
        // value on a different header.
        connection.put_header("Host", &["localhost"]);
        connection.put_header("Connection", &["keep-alive"]);
        connection.put_header("X-Custom", &["Upgrade"]);
        assert!(!connection.disable_buffering());

        connection.put_header("Connection", &["Upgrade"]);
        assert!(connection.disable_buffering());
    }

    #[test]
    fn test_upgrade_detection_within_multiple_values() {
        let mut connection = test_connection();

        connection.put_header("Connection", &["keep-alive", "Upgrade"]);

        assert!(connection.disable_buffering());
    }

    /// The full request head arrives on the wire in one piece, terminated
    /// by an empty line.
    #[cfg(unix)]
    #[test]
    fn test_request_head_is_written_on_end_headers() {
        let (client, mut server) = UnixStream::pair().unwrap();

        let mut connection = test_connection();
        connection.stream = Some(Box::new(client));

        connection.put_request("GET", "/v1.41/_ping").unwrap();
        connection.put_header("Host", &["localhost"]);
        connection.end_headers().unwrap();
        // Hang up so the read below terminates.
        connection.close();

        let mut request = String::new();
        server.read_to_string(&mut request).unwrap();

        assert_eq!(
            request,
            "GET /v1.41/_ping HTTP/1.1\r\nHost: localhost\r\n\r\n"
        );
    }

    /// Response reads work both buffered and unbuffered.
    #[cfg(unix)]
    #[test]
    fn test_response_reader_modes() {
        for upgrade in [false, true] {
            let (client, mut server) = UnixStream::pair().unwrap();

            let mut connection = test_connection();
            connection.stream = Some(Box::new(client));
            if upgrade {
                connection.put_header("Connection", &["Upgrade"]);
            }

            server.write_all(b"response bytes").unwrap();
            drop(server);

            let mut response = Vec::new();
            connection
                .response_reader()
                .unwrap()
                .read_to_end(&mut response)
                .unwrap();

            assert_eq!(response, b"response bytes".to_vec());
        }
    }
}
