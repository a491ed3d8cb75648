//! TLS configuration and connection establishment

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};

use crate::constants::CONNECTION_TIMEOUT;
use crate::error::ConnectError;
use crate::identity::{Identity, certificate_fingerprint};

/// TLS stream to the server
pub(super) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Build a connector that accepts any server certificate and optionally
/// presents `identity` as the client certificate
fn connector(identity: Option<&Identity>) -> Result<TlsConnector, ConnectError> {
    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier));

    let mut config = match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.certificate_chain()?, identity.private_key()?)
            .map_err(|e| ConnectError::Tls(e.to_string()))?,
        None => builder.with_no_client_auth(),
    };

    // Voice servers commonly run with self-signed certificates, so hostnames aren't checked
    config.enable_sni = false;

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Custom certificate verifier that accepts any certificate
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// Establish a TLS connection and return the server certificate fingerprint
pub(super) async fn establish_connection(
    address: &str,
    port: u16,
    identity: Option<&Identity>,
) -> Result<(TlsStream, String), ConnectError> {
    let connector = connector(identity)?;

    // Doesn't matter which name: SNI is off and any certificate is accepted
    let server_name = ServerName::try_from("localhost")
        .map_err(|e| ConnectError::Tls(e.to_string()))?
        .to_owned();

    let socket_addr = tokio::net::lookup_host((address, port))
        .await
        .map_err(|e| ConnectError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| ConnectError::InvalidAddress {
            address: address.to_string(),
            reason: "no addresses found".to_string(),
        })?;

    let tcp_stream = tokio::time::timeout(CONNECTION_TIMEOUT, TcpStream::connect(socket_addr))
        .await
        .map_err(|_| ConnectError::Timeout(CONNECTION_TIMEOUT))??;
    tcp_stream.set_nodelay(true)?;

    let tls_stream = tokio::time::timeout(
        CONNECTION_TIMEOUT,
        connector.connect(server_name, tcp_stream),
    )
    .await
    .map_err(|_| ConnectError::Timeout(CONNECTION_TIMEOUT))?
    .map_err(|e| ConnectError::Tls(e.to_string()))?;

    let fingerprint = server_fingerprint(&tls_stream)?;
    Ok((tls_stream, fingerprint))
}

/// SHA-256 fingerprint of the server's end-entity certificate
fn server_fingerprint(tls_stream: &TlsStream) -> Result<String, ConnectError> {
    let (_io, session) = tls_stream.get_ref();
    let cert = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ConnectError::Tls("server sent no certificate".to_string()))?;

    Ok(certificate_fingerprint(cert.as_ref()))
}
