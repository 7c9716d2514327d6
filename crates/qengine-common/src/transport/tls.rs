use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::auth::TlsMaterial;
use crate::protocol::error::{QengineError, Result};

/// Builds the mutual-TLS client configuration for Engine connections.
///
/// With `verify` set, the server must chain to one of the roots in
/// `material`. Without it, any server certificate is accepted but the client
/// certificate is still presented. Every failure is an
/// [`QengineError::Auth`].
pub fn client_config(material: TlsMaterial, verify: bool) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| QengineError::Auth(format!("unusable TLS protocol versions: {}", e)))?;

    let builder = if verify {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(material.roots);
        if added == 0 {
            return Err(QengineError::Auth(format!(
                "no usable root CA certificate ({} rejected)",
                ignored
            )));
        }
        builder.with_root_certificates(roots)
    } else {
        tracing::warn!("Server certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(AcceptAnyServerCert::new(provider))
    };

    let config = builder
        .with_client_auth_cert(material.client_chain, material.client_key)
        .map_err(|e| QengineError::Auth(format!("invalid client certificate or key: {}", e)))?;

    Ok(Arc::new(config))
}

/// Accepts any server certificate. Handshake signatures are still checked,
/// so the peer must hold the key for the certificate it presents.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl AcceptAnyServerCert {
    fn new(provider: Arc<CryptoProvider>) -> Arc<Self> {
        Arc::new(Self(provider))
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
