#![doc = include_str!("../README.md")]

pub(crate) mod internal_prelude {
    #![allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

pub mod error;
pub mod settings;
pub mod tls;
pub mod transport;

pub use error::Error;
pub use settings::AdapterSettings;
pub use transport::adapter::TransportAdapter;
pub use transport::conn::DaemonConnection;
pub use transport::pool::ConnectionPool;
pub use transport::socket::{ConnectionSettings, GenericStream, Stream, Timeout};

pub mod prelude {
    pub use super::error::Error;
    pub use super::settings::AdapterSettings;
    pub use super::transport::adapter::TransportAdapter;
    pub use super::transport::protocol::{
        consume_socket_output, demux_adaptor, frames_iter, read, read_exactly, Output,
    };
    pub use super::transport::socket::{
        get_client_stream, ConnectionSettings, GenericStream, Stream, Timeout,
    };
}
