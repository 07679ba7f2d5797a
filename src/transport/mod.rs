//! Everything that's necessary to talk to the container daemon.
//!
//! ## Sockets
//!
//! The daemon speaks HTTP, but rarely over plain TCP. Depending on the
//! platform and configuration it listens on
//!
//! - a Unix domain socket (the default on unix systems),
//! - a Windows named pipe,
//! - or a TCP socket, in which case the connection is TLS encrypted.
//!
//! The [socket] module hides the differences behind the
//! [Stream](socket::Stream) trait, the [npipe] module contains the named
//! pipe socket emulation for Windows.
//!
//! ## Connections and pooling
//!
//! The HTTP layer doesn't create sockets itself. It asks a
//! [TransportAdapter](adapter::TransportAdapter) for the connection pool of
//! a logical URL and checks [DaemonConnection](conn::DaemonConnection)s out
//! of that pool. The adapter keeps one pool per URL in a bounded LRU
//! registry, see the [pool] module.
//!
//! ## The attach stream
//!
//! Attaching to a running container turns the connection into a long-lived
//! byte stream on which the daemon multiplexes the process' stdout and
//! stderr, framed with an 8 byte header. The [protocol] module decodes that
//! stream; details on the wire format can be found in its module docs.
pub mod adapter;
pub mod conn;
/// Named pipe client socket, the transport used on Windows.
pub mod npipe;
pub mod pool;
/// The attach stream wire protocol and low-level read primitives.
pub mod protocol;
/// Low-level socket handling code.
pub mod socket;

pub use protocol::{
    consume_socket_output, demux_adaptor, frames_iter, next_frame_header, read, read_exactly,
};
pub use socket::get_client_stream;
