//! Minimal bindings over the Win32 surface needed for named pipe clients.
//!
//! Two implementations exist, selected at build time:
//! the real `kernel32` bindings on Windows and a stub everywhere else.
//! The stub keeps the named pipe socket and everything built on top of it
//! compiling and testable on all platforms: opening "succeeds" with the null
//! handle, reads signal EOF and writes report zero written bytes.
use std::io;

/// Open for reading.
pub const GENERIC_READ: u32 = 0x8000_0000;
/// Open for writing.
pub const GENERIC_WRITE: u32 = 0x4000_0000;
/// Only open the pipe if it already exists.
pub const OPEN_EXISTING: u32 = 3;
/// Request anonymous-level impersonation for the pipe server.
pub const SECURITY_ANONYMOUS: u32 = 0;
/// The security flags above are present in the flags argument.
pub const SECURITY_SQOS_PRESENT: u32 = 0x0010_0000;

/// All pipe instances are taken by other clients.
pub const ERROR_PIPE_BUSY: u32 = 0xE7;
/// The peer closed its end of the pipe.
/// Named pipes report a graceful close as this error instead of a
/// zero-length read.
pub const ERROR_BROKEN_PIPE: u32 = 109;

/// Wait forever for an operation to finish.
pub const NMPWAIT_WAIT_FOREVER: u32 = 0xffff_ffff;
/// Don't wait at all.
pub const NMPWAIT_NO_WAIT: u32 = 1;

/// Shared Win32 logic
#[cfg_attr(not(target_os = "windows"), path = "stub.rs")]
#[cfg_attr(target_os = "windows", path = "windows.rs")]
mod platform;
pub(crate) use self::platform::*;

/// An open OS handle to a named pipe.
///
/// The raw value is stored as an integer so socket types holding one stay
/// `Send`; it is only cast back to a pointer at the FFI boundary.
/// The handle is not reference counted, whoever closes it first invalidates
/// it for every copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeHandle(pub(crate) usize);

impl PipeHandle {
    /// The null handle, handed out when the real bindings are absent.
    pub const NULL: PipeHandle = PipeHandle(0);
}

/// The static properties of a pipe as reported by `GetNamedPipeInfo`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipeInfo {
    pub flags: u32,
    pub out_buffer_size: u32,
    pub in_buffer_size: u32,
    pub max_instances: u32,
}

/// A failed Win32 call: the raw OS error code, the name of the function that
/// failed and a human readable description.
#[derive(thiserror::Error, Debug)]
#[error("{function} failed with OS error {code}: {message}")]
pub struct Win32Error {
    pub code: u32,
    pub function: &'static str,
    pub message: String,
}

impl Win32Error {
    pub fn new(code: u32, function: &'static str, message: String) -> Self {
        Win32Error {
            code,
            function,
            message,
        }
    }
}

impl From<Win32Error> for io::Error {
    fn from(err: Win32Error) -> io::Error {
        // Derive the `ErrorKind` from the raw code, but keep the richer
        // error as the payload. `ERROR_BROKEN_PIPE` maps to `BrokenPipe`
        // this way, which the read primitives treat as EOF.
        let kind = io::Error::from_raw_os_error(err.code as i32).kind();
        io::Error::new(kind, err)
    }
}
