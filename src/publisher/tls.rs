//! TLS trust for the broker connection
//!
//! A custom CA bundle replaces the system roots entirely. Without one the
//! platform trust store is used. Certificate verification is never disabled.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

/// Which roots the broker certificate is verified against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsTrust {
    /// Only the certificates in this PEM file
    Bundle(PathBuf),

    /// The platform's native trust store
    System,
}

impl From<Option<PathBuf>> for TlsTrust {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(TlsTrust::System, TlsTrust::Bundle)
    }
}

#[derive(Debug)]
pub enum TlsError {
    /// The CA bundle could not be read
    Read { path: PathBuf, source: std::io::Error },

    /// The CA bundle is not valid PEM
    Parse { path: PathBuf, source: std::io::Error },

    /// The CA bundle or system store yielded no usable certificate
    NoCertificates(String),

    /// The native trust store could not be loaded
    NativeRoots(std::io::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::Read { path, source } => {
                write!(f, "failed to read CA bundle {}: {source}", path.display())
            }
            TlsError::Parse { path, source } => {
                write!(f, "failed to parse CA bundle {}: {source}", path.display())
            }
            TlsError::NoCertificates(origin) => write!(f, "no usable certificates in {origin}"),
            TlsError::NativeRoots(err) => write!(f, "failed to load system trust store: {err}"),
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TlsError::Read { source, .. } | TlsError::Parse { source, .. } => Some(source),
            TlsError::NativeRoots(err) => Some(err),
            TlsError::NoCertificates(_) => None,
        }
    }
}

/// Builds the rustls client configuration for `trust`.
pub fn client_config(trust: &TlsTrust) -> Result<Arc<ClientConfig>, TlsError> {
    let roots = match trust {
        TlsTrust::Bundle(path) => load_bundle(path)?,
        TlsTrust::System => load_system()?,
    };

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

fn load_bundle(path: &Path) -> Result<RootCertStore, TlsError> {
    debug!("loading CA bundle from {}", path.display());

    let pem = std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!("ignored {ignored} unparsable certificates in {}", path.display());
    }
    if added == 0 {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }

    debug!("trusting {added} certificates from {}", path.display());
    Ok(roots)
}

fn load_system() -> Result<RootCertStore, TlsError> {
    let certs = rustls_native_certs::load_native_certs().map_err(TlsError::NativeRoots)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        debug!("ignored {ignored} unparsable system certificates");
    }
    if added == 0 {
        return Err(TlsError::NoCertificates("system trust store".to_string()));
    }

    debug!("trusting {added} system certificates");
    Ok(roots)
}
