//! PEM loading for the optional TLS transport.

use std::fs::File;
use std::io::{self, BufReader};

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{Item, certs, read_one};

/// Loads a certificate chain from a PEM file.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be opened or holds no valid certificate.
pub fn load_certs(path: &str) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("opening cert {path}: {e}")))?;
    let mut reader = BufReader::new(file);

    let chain: Vec<CertificateDer<'static>> = certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid certs: {e}")))?;

    if chain.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{path} did not contain any certificates"),
        ));
    }
    Ok(chain)
}

/// Loads the first private key found in a PEM file (PKCS1, PKCS8 or SEC1).
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be opened, is malformed, or has no key.
pub fn load_private_key(path: &str) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("opening key {path}: {e}")))?;
    let mut reader = BufReader::new(file);

    loop {
        match read_one(&mut reader) {
            Ok(Some(Item::Pkcs1Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Pkcs8Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Sec1Key(key))) => return Ok(key.into()),
            Ok(None) => break,
            Ok(Some(_)) => {}
            Err(e) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("key parse error: {e}"),
                ));
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("no private key found in {path}"),
    ))
}

/// A root store trusting only the CA certificates in `path`.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be loaded or a certificate is rejected.
pub fn load_pinned_roots(path: &str) -> io::Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(path)? {
        store
            .add(cert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad CA cert: {e}")))?;
    }
    Ok(store)
}
