//! The daemon's attach stream protocol.
//!
//! When attaching to (or exec-ing inside) a container without a tty, the
//! daemon multiplexes the process' stdout and stderr over a single
//! connection. Every chunk of output is framed:
//!
//! 1. An 8 byte header: byte 0 is the stream id (1 = stdout, 2 = stderr),
//!    bytes 1-3 are reserved, bytes 4-7 are the payload length as a
//!    big-endian u32.
//! 2. Exactly `length` payload bytes.
//!
//! This repeats until the daemon hangs up. With a tty the output is a plain
//! byte stream without any framing, since everything is already merged into
//! the terminal.
//!
//! On top of the [read] and [read_exactly] primitives, [frames_iter] decodes
//! the stream lazily and [consume_socket_output] drains it into either one
//! combined buffer or separate stdout/stderr buffers.
use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

// Reexport all stream/socket related stuff for convenience purposes
pub use super::socket::*;
use crate::error::Error;

/// The stream id the daemon tags stdout frames with.
pub const STDOUT: u8 = 1;
/// The stream id the daemon tags stderr frames with.
pub const STDERR: u8 = 2;
/// Stream id plus three reserved bytes plus a big-endian u32 length.
pub const FRAME_HEADER_LENGTH: usize = 8;
/// Read size for unframed (tty) streams.
pub const DEFAULT_READ_SIZE: usize = 4096;

/// The decoded header of one attach stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub stream_id: u8,
    pub length: usize,
}

/// Read at most `n` bytes from the socket with a single read request.
///
/// On Unix this first waits until the socket's file descriptor becomes
/// readable (the result of the wait is irrelevant, the read below does the
/// real work). Transports without a file descriptor skip the wait.
///
/// Two classes of errors are translated into an empty buffer instead of
/// being propagated:
///
/// - Recoverable interrupts (`EINTR`, `EWOULDBLOCK`, `EDEADLK`). The caller
///   is expected to loop.
/// - A broken pipe. Named pipes report a graceful peer close this way, so
///   mapping it to a zero-length read gives all transports uniform EOF
///   semantics.
pub fn read(stream: &mut GenericStream, n: usize) -> Result<Vec<u8>, Error> {
    #[cfg(unix)]
    if let Some(fd) = stream.raw_fd() {
        wait_readable(fd);
    }

    let mut buffer = vec![0; n];
    match stream.read(&mut buffer) {
        Ok(received_bytes) => {
            buffer.truncate(received_bytes);
            Ok(buffer)
        }
        Err(err) if is_recoverable(&err) => Ok(Vec::new()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(Vec::new()),
        Err(err) => Err(Error::IoError("reading from daemon stream".to_string(), err)),
    }
}

/// Block until the file descriptor is readable, ignoring the result.
#[cfg(unix)]
fn wait_readable(fd: std::os::unix::io::RawFd) {
    use nix::poll::{poll, PollFd, PollFlags};

    let mut poll_fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let _ = poll(&mut poll_fds, -1);
}

fn is_recoverable(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    ) {
        return true;
    }

    #[cfg(unix)]
    if err.raw_os_error() == Some(nix::errno::Errno::EDEADLK as i32) {
        return true;
    }

    false
}

/// Read exactly `n` bytes from the socket.
///
/// An empty read before `n` bytes are together fails with
/// [Error::UnexpectedEof]. This is a hard error: the stream ended in a
/// place the protocol doesn't allow.
pub fn read_exactly(stream: &mut GenericStream, n: usize) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(n);
    while data.len() < n {
        let next_data = read(stream, n - data.len())?;
        if next_data.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        data.extend_from_slice(&next_data);
    }

    Ok(data)
}

/// Decode the header of the next frame waiting on the socket.
///
/// A clean EOF on the header read means the daemon hung up between two
/// frames and yields `Ok(None)`. Everything else propagates.
pub fn next_frame_header(stream: &mut GenericStream) -> Result<Option<FrameHeader>, Error> {
    let header = match read_exactly(stream, FRAME_HEADER_LENGTH) {
        Ok(header) => header,
        Err(Error::UnexpectedEof) => return Ok(None),
        Err(err) => return Err(err),
    };

    let stream_id = header[0];
    // Bytes 1-3 are reserved.
    let length = Cursor::new(&header[4..]).read_u32::<BigEndian>()? as usize;

    Ok(Some(FrameHeader { stream_id, length }))
}

/// Lazily decode the frames arriving on the socket.
///
/// With `tty` set, the stream carries no framing and every chunk is
/// attributed to stdout. Without it, frame headers are decoded and each
/// payload chunk is yielded with its stream id as it arrives. Payloads are
/// *not* accumulated: a large frame surfaces as multiple chunks, strictly
/// in wire order.
///
/// The iterator ends on EOF and is not restartable.
pub fn frames_iter(stream: &mut GenericStream, tty: bool) -> FramesIter<'_> {
    FramesIter {
        stream,
        tty,
        stream_id: STDOUT,
        remaining: 0,
        done: false,
    }
}

/// Iterator returned by [frames_iter].
pub struct FramesIter<'a> {
    stream: &'a mut GenericStream,
    tty: bool,
    /// The id of the frame currently being drained.
    stream_id: u8,
    /// Payload bytes left in the frame currently being drained.
    remaining: usize,
    done: bool,
}

impl Iterator for FramesIter<'_> {
    type Item = Result<(u8, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.tty {
            self.next_raw_chunk()
        } else {
            self.next_multiplexed_chunk()
        }
    }
}

impl FramesIter<'_> {
    /// Tty streams are not multiplexed, everything is stdout.
    fn next_raw_chunk(&mut self) -> Option<Result<(u8, Vec<u8>), Error>> {
        match read(self.stream, DEFAULT_READ_SIZE) {
            Ok(chunk) if chunk.is_empty() => {
                self.done = true;
                None
            }
            Ok(chunk) => Some(Ok((STDOUT, chunk))),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn next_multiplexed_chunk(&mut self) -> Option<Result<(u8, Vec<u8>), Error>> {
        loop {
            // Between frames: decode the next header.
            if self.remaining == 0 {
                match next_frame_header(self.stream) {
                    Ok(Some(header)) => {
                        self.stream_id = header.stream_id;
                        self.remaining = header.length;
                        // Zero-length frames carry nothing to yield.
                        if self.remaining == 0 {
                            continue;
                        }
                    }
                    Ok(None) => {
                        self.done = true;
                        return None;
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }

            return match read(self.stream, self.remaining) {
                Ok(chunk) if chunk.is_empty() => {
                    // EOF in the middle of a frame.
                    self.done = true;
                    None
                }
                Ok(chunk) => {
                    self.remaining -= chunk.len();
                    Some(Ok((self.stream_id, chunk)))
                }
                Err(err) => {
                    self.done = true;
                    Some(Err(err))
                }
            };
        }
    }
}

/// The drained result of an attach stream, see [consume_socket_output].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// All payloads concatenated in arrival order, regardless of stream id.
    Combined(Vec<u8>),
    /// Stdout and stderr split into their own buffers.
    /// A side stays `None` if not a single frame was tagged for it.
    Demuxed {
        stdout: Option<Vec<u8>>,
        stderr: Option<Vec<u8>>,
    },
}

/// Drain a frame iterator into its final output.
///
/// Without `demux` the payloads are concatenated in arrival order. With
/// `demux` the frames are split by stream id into two independent buffers;
/// a stream without any frames ends up absent rather than empty.
pub fn consume_socket_output<I>(frames: I, demux: bool) -> Result<Output, Error>
where
    I: IntoIterator<Item = Result<(u8, Vec<u8>), Error>>,
{
    if !demux {
        let mut combined = Vec::new();
        for frame in frames {
            let (_, data) = frame?;
            combined.extend_from_slice(&data);
        }
        return Ok(Output::Combined(combined));
    }

    let mut stdout: Option<Vec<u8>> = None;
    let mut stderr: Option<Vec<u8>> = None;
    for frame in frames {
        let (stream_id, data) = frame?;
        // Exactly one side of the tuple is set per frame.
        let (out_data, err_data) = demux_adaptor(stream_id, data)?;
        if let Some(data) = out_data {
            stdout.get_or_insert_with(Vec::new).extend_from_slice(&data);
        }
        if let Some(data) = err_data {
            stderr.get_or_insert_with(Vec::new).extend_from_slice(&data);
        }
    }

    Ok(Output::Demuxed { stdout, stderr })
}

/// Attribute one frame to its stream.
///
/// Any id other than [STDOUT] or [STDERR] means the stream is corrupt;
/// there is no way to recover in-band from that.
pub fn demux_adaptor(
    stream_id: u8,
    data: Vec<u8>,
) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), Error> {
    match stream_id {
        STDOUT => Ok((Some(data), None)),
        STDERR => Ok((None, Some(data))),
        _ => Err(Error::InvalidStreamId(stream_id)),
    }
}
