use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::{ConnectionSettings, GenericStream, Stream, Timeout};
use crate::error::Error;
use crate::tls::{get_tls_connector, TlsStream};

impl Stream for UnixStream {
    fn set_timeout(&mut self, timeout: Timeout) -> Result<(), Error> {
        match timeout {
            Timeout::Blocking => {
                self.set_nonblocking(false)?;
                self.set_read_timeout(None)?;
                self.set_write_timeout(None)?;
            }
            Timeout::NonBlocking => self.set_nonblocking(true)?,
            Timeout::Limit(duration) => {
                self.set_nonblocking(false)?;
                self.set_read_timeout(Some(duration))?;
                self.set_write_timeout(Some(duration))?;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        UnixStream::shutdown(self, Shutdown::Both)
            .map_err(|err| Error::IoError("shutting down unix socket".to_string(), err))
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}

impl Stream for TlsStream {
    fn set_timeout(&mut self, timeout: Timeout) -> Result<(), Error> {
        match timeout {
            Timeout::Blocking => {
                self.sock.set_nonblocking(false)?;
                self.sock.set_read_timeout(None)?;
                self.sock.set_write_timeout(None)?;
            }
            Timeout::NonBlocking => self.sock.set_nonblocking(true)?,
            Timeout::Limit(duration) => {
                self.sock.set_nonblocking(false)?;
                self.sock.set_read_timeout(Some(duration))?;
                self.sock.set_write_timeout(Some(duration))?;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.sock
            .shutdown(Shutdown::Both)
            .map_err(|err| Error::IoError("shutting down tls socket".to_string(), err))
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.sock.as_raw_fd())
    }
}

/// Get a new stream to the daemon. \
/// This can either be a UnixStream or a Tls encrypted TCPStream, depending on
/// the parameters.
pub fn get_client_stream(settings: ConnectionSettings) -> Result<GenericStream, Error> {
    match settings {
        // Create a unix socket
        ConnectionSettings::UnixSocket { path } => {
            let stream = UnixStream::connect(&path).map_err(|err| {
                Error::IoPathError(path.clone(), "connecting to daemon. Is it running?", err)
            })?;

            Ok(Box::new(stream))
        }
        // Connect to the daemon via TCP
        ConnectionSettings::TlsTcpSocket {
            host,
            port,
            certificate,
        } => {
            let address = format!("{host}:{port}");
            let tcp_stream = TcpStream::connect(&address).map_err(|_| {
                Error::Connection(format!(
                    "Failed to connect to the daemon on {address}. Is it running?"
                ))
            })?;

            // Get the configured rustls connector
            let tls_connector = get_tls_connector(&certificate).map_err(|err| {
                Error::Connection(format!("Failed to initialize tls connector:\n{err}."))
            })?;

            // Initialize the TLS layer
            let stream = tls_connector
                .connect(&host, tcp_stream)
                .map_err(|err| Error::Connection(format!("Failed to initialize tls:\n{err}.")))?;

            Ok(Box::new(stream))
        }
    }
}
