//! TLS session implementation

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

use crate::common::{Connection, Result};
use crate::error::Error;

use super::{Session, TlsConfig};

/// TLS wrapper for encrypting connections
pub struct TlsSession {
    config: TlsConfig,
    connector: TlsConnector,
    acceptor: Option<TlsAcceptor>,
}

impl TlsSession {
    /// Build the client connector and, when a certificate and key are
    /// configured, the server acceptor.
    pub fn new(config: TlsConfig) -> Result<Self> {
        let connector = Self::build_connector(&config);
        let acceptor = Self::build_acceptor(&config)?;
        Ok(Self {
            config,
            connector,
            acceptor,
        })
    }

    fn build_connector(config: &TlsConfig) -> TlsConnector {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if config.allow_insecure {
            tls_config
                .dangerous()
                .set_certificate_verifier(Arc::new(InsecureVerifier));
        }

        TlsConnector::from(Arc::new(tls_config))
    }

    fn build_acceptor(config: &TlsConfig) -> Result<Option<TlsAcceptor>> {
        let (cert_file, key_file) = match (&config.certificate_file, &config.key_file) {
            (Some(cert), Some(key)) => (cert, key),
            (None, None) => return Ok(None),
            _ => {
                return Err(Error::Config(
                    "TLS server requires both certificate_file and key_file".into(),
                ))
            }
        };

        let certs = Self::load_certs(cert_file)?;
        let key = Self::load_private_key(key_file)?;

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(format!("Invalid certificate or key: {}", e)))?;

        Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
    }

    fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
        let file = File::open(path).map_err(|e| {
            Error::Config(format!("Failed to open certificate file {}: {}", path, e))
        })?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("Failed to parse certificates: {}", e)))?;
        if certs.is_empty() {
            return Err(Error::Config(format!("No certificates found in {}", path)));
        }
        Ok(certs)
    }

    fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("Failed to open key file {}: {}", path, e)))?;
        let mut reader = BufReader::new(file);

        rustls_pemfile::private_key(&mut reader)
            .map_err(|e| Error::Config(format!("Failed to parse private key: {}", e)))?
            .ok_or_else(|| Error::Config("No valid private key found in file".into()))
    }
}

#[async_trait]
impl Session for TlsSession {
    async fn wrap_client(&self, conn: Connection, peer_name: &str) -> Result<Connection> {
        let server_name = self.config.server_name.as_deref().unwrap_or(peer_name);

        let domain = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::Tls(format!("Invalid server name: {}", server_name)))?;

        let peer = conn.peer().to_string();
        debug!("TLS: connecting to {} as {}", peer, server_name);
        let tls_stream = self
            .connector
            .connect(domain, conn)
            .await
            .map_err(|e| Error::Tls(format!("Handshake with {} failed: {}", peer, e)))?;
        Ok(Connection::new(tls_stream, peer).with_encrypted(true))
    }

    async fn wrap_server(&self, conn: Connection) -> Result<Connection> {
        let acceptor = self.acceptor.as_ref().ok_or_else(|| {
            Error::Config("TLS server requires certificate_file and key_file".into())
        })?;

        let peer = conn.peer().to_string();
        let tls_stream = acceptor
            .accept(conn)
            .await
            .map_err(|e| Error::Tls(format!("Handshake with {} failed: {}", peer, e)))?;
        Ok(Connection::new(tls_stream, peer).with_encrypted(true))
    }
}

/// Certificate verifier that accepts anything, for self-signed acceptors
#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_only_session_builds() {
        let session = TlsSession::new(TlsConfig::default()).unwrap();
        assert!(session.acceptor.is_none());
    }

    #[test]
    fn test_missing_key_file_is_config_error() {
        let config = TlsConfig {
            certificate_file: Some("/nonexistent/cert.pem".into()),
            ..Default::default()
        };
        assert!(matches!(TlsSession::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_unreadable_certificate_is_config_error() {
        let config = TlsConfig {
            certificate_file: Some("/nonexistent/cert.pem".into()),
            key_file: Some("/nonexistent/key.pem".into()),
            ..Default::default()
        };
        assert!(matches!(TlsSession::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_configured_server_name_overrides_peer_name() {
        let session = TlsSession::new(TlsConfig {
            server_name: Some("not a host name".into()),
            ..Default::default()
        })
        .unwrap();
        let (client, _server) = tokio::io::duplex(64);

        // "localhost" alone would be accepted; the override is what fails
        let err = session
            .wrap_client(Connection::new(client, "test"), "localhost")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tls(ref msg) if msg.contains("not a host name")));
    }

    #[tokio::test]
    async fn test_server_wrap_without_certificate_fails() {
        let session = TlsSession::new(TlsConfig::default()).unwrap();
        let (client, _server) = tokio::io::duplex(64);
        let result = session.wrap_server(Connection::new(client, "test")).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
