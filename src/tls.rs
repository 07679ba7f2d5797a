//! Helper functions for reading and handling TLS certificates.
use std::{fs::File, io::BufReader, net::TcpStream, path::Path};

use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use rustls_connector::RustlsConnector;

use crate::error::Error;

/// A TCP stream to the daemon with the TLS layer on top.
pub type TlsStream = rustls_connector::TlsStream<TcpStream>;

/// Load the daemon's certificate from a given path.
///
/// This certificate needs to be provided when connecting via
/// [ConnectionSettings::TlsTcpSocket](crate::transport::socket::ConnectionSettings::TlsTcpSocket)
pub fn load_ca<'a>(path: &Path) -> Result<CertificateDer<'a>, Error> {
    let file = File::open(path)
        .map_err(|err| Error::IoPathError(path.to_path_buf(), "opening cert", err))?;

    let cert = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, std::io::Error>>()
        .map_err(|_| Error::CertificateFailure("Failed to parse daemon certificate.".into()))?
        .into_iter()
        .next()
        .ok_or_else(|| Error::CertificateFailure("Couldn't find CA certificate in file".into()))?;

    Ok(cert)
}

/// Get a blocking TLS connector that trusts exactly the daemon's certificate.
///
/// Daemons usually run with a self-signed certificate, so the system trust
/// store is of no use here.
pub fn get_tls_connector(certificate: &Path) -> Result<RustlsConnector, Error> {
    let cert = load_ca(certificate)?;

    let mut root_store = RootCertStore::empty();
    root_store.add(cert).map_err(|err| {
        Error::CertificateFailure(format!("Couldn't add daemon certificate to trust store: {err}"))
    })?;

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config.into())
}
