//! Stevedore-lib errors.
use std::path::PathBuf;

use crate::transport::npipe::win32::Win32Error;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Any errors regarding the certificate setup.
    #[error("Invalid or malformed certificate: {0}")]
    CertificateFailure(String),

    #[error("{0}")]
    Connection(String),

    /// Thrown when a socket is used after it was closed.
    /// This is a programmer error and never retried.
    #[error("Can not reuse socket after connection was closed.")]
    SocketClosed,

    /// The attach stream ended in the middle of a frame.
    /// This is distinct from a clean EOF between frames.
    #[error("Unexpected EOF")]
    UnexpectedEof,

    /// A frame carried a stream id that is neither stdout nor stderr.
    /// The stream is corrupt and can't be demultiplexed any further.
    #[error("{0} is not a valid stream id")]
    InvalidStreamId(u8),

    #[error("I/O error while {0}:\n{1}")]
    IoError(String, std::io::Error),

    #[error("Unexpected I/O error:\n{0}")]
    RawIoError(#[from] std::io::Error),

    #[error("I/O error at path {0:?} while {1}:\n{2}")]
    IoPathError(PathBuf, &'static str, std::io::Error),

    /// A raw failure from the named pipe layer.
    #[error(transparent)]
    Win32(#[from] Win32Error),
}
