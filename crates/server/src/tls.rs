use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::StartupError;

/// Names the self-signed certificate is valid for.
const SELF_SIGNED_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

const ALPN_H2: &[u8] = b"h2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSource {
    SelfSigned,
    PemFiles { cert_path: PathBuf, key_path: PathBuf },
}

/// Server certificate chain and key.
#[derive(Debug)]
pub struct TlsMaterial {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    pub fn load(source: &TlsSource) -> Result<Self, StartupError> {
        match source {
            TlsSource::SelfSigned => Self::self_signed(),
            TlsSource::PemFiles {
                cert_path,
                key_path,
            } => Self::from_pem_files(cert_path, key_path),
        }
    }

    pub fn self_signed() -> Result<Self, StartupError> {
        let names = SELF_SIGNED_NAMES
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        let certified = rcgen::generate_simple_self_signed(names).map_err(|e| StartupError {
            code: "ERR_TLS_MATERIAL",
            message: format!("failed to generate self-signed certificate: {e}"),
        })?;

        Ok(Self {
            cert_chain: vec![certified.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
        })
    }

    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, StartupError> {
        let cert_chain = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StartupError {
                code: "ERR_TLS_MATERIAL",
                message: format!("failed to parse certificates: {e}"),
            })?;
        if cert_chain.is_empty() {
            return Err(StartupError {
                code: "ERR_TLS_MATERIAL",
                message: "certificate file contains no certificates".to_string(),
            });
        }

        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| StartupError {
            code: "ERR_TLS_MATERIAL",
            message: format!("failed to parse private key: {e}"),
        })?;

        Ok(Self { cert_chain, key })
    }

    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, StartupError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|_| StartupError {
                code: "ERR_TLS_MATERIAL",
                message: format!("failed to read {}", path.display()),
            })
        };
        Self::from_pem(&read(cert_path)?, &read(key_path)?)
    }

    /// DER of the leaf certificate, for client trust stores.
    pub fn root_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.cert_chain.first()
    }

    /// Server config offering only `h2` over ALPN.
    pub fn acceptor(&self) -> Result<TlsAcceptor, StartupError> {
        let mut config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(tls_config_error)?
        .with_no_client_auth()
        .with_single_cert(self.cert_chain.clone(), self.key.clone_key())
        .map_err(tls_config_error)?;
        config.alpn_protocols = vec![ALPN_H2.to_vec()];

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn tls_config_error(err: rustls::Error) -> StartupError {
    StartupError {
        code: "ERR_TLS_CONFIG",
        message: format!("invalid TLS configuration: {err}"),
    }
}
