//! Persistent client identity
//!
//! The bot authenticates with a self-signed certificate. The key and
//! certificate are generated on first start and reused afterwards, so the
//! server keeps recognizing the bot across restarts. A pair that can't be
//! used (unparsable, expired, or not matching each other) is replaced.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{info, warn};

use crate::constants::{
    CERT_COMMON_NAME, CERT_COUNTRY, CERT_LOCALITY, CERT_ORGANIZATION, CERT_ORGANIZATIONAL_UNIT,
    CERT_SERIAL_NUMBER, CERT_STATE, CERT_VALIDITY_DAYS,
};
use crate::error::IdentityError;

/// Key and certificate presented to the server during the TLS handshake
#[derive(Clone)]
pub struct Identity {
    key_path: PathBuf,
    cert_path: PathBuf,
    key_pem: String,
    cert_pem: String,
    fingerprint: String,
}

impl Identity {
    fn new(
        key_path: &Path,
        cert_path: &Path,
        key_pem: String,
        cert_pem: String,
    ) -> Result<Self, IdentityError> {
        let der = pem::parse(&cert_pem).map_err(|e| IdentityError::InvalidPem {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            key_path: key_path.to_path_buf(),
            cert_path: cert_path.to_path_buf(),
            key_pem,
            cert_pem,
            fingerprint: certificate_fingerprint(der.contents()),
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// SHA-256 fingerprint of the certificate (`AA:BB:...`)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Certificate chain in the form rustls expects
    pub fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
        let certs = rustls_pemfile::certs(&mut self.cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IdentityError::InvalidPem {
                path: self.cert_path.clone(),
                reason: e.to_string(),
            })?;

        if certs.is_empty() {
            return Err(IdentityError::InvalidPem {
                path: self.cert_path.clone(),
                reason: "no certificate found".to_string(),
            });
        }
        Ok(certs)
    }

    /// Private key in the form rustls expects
    pub fn private_key(&self) -> Result<PrivateKeyDer<'static>, IdentityError> {
        rustls_pemfile::private_key(&mut self.key_pem.as_bytes())
            .map_err(|e| IdentityError::InvalidPem {
                path: self.key_path.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| IdentityError::InvalidPem {
                path: self.key_path.clone(),
                reason: "no private key found".to_string(),
            })
    }
}

// The key material stays out of log output
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("key_path", &self.key_path)
            .field("cert_path", &self.cert_path)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Make sure a usable key and certificate exist at the given paths
///
/// Existing files are reused as long as they parse, the certificate is
/// currently valid and it belongs to the key. Otherwise both files are
/// (re)generated and written with owner-only permissions.
pub fn ensure_identity(key_path: &Path, cert_path: &Path) -> Result<Identity, IdentityError> {
    let key_exists = key_path.exists();
    let cert_exists = cert_path.exists();

    if key_exists && cert_exists {
        let key_pem = read_pem(key_path)?;
        let cert_pem = read_pem(cert_path)?;

        match validate_pair(&key_pem, &cert_pem) {
            Ok(()) => {
                let identity = Identity::new(key_path, cert_path, key_pem, cert_pem)?;
                info!(
                    cert = %cert_path.display(),
                    fingerprint = %identity.fingerprint(),
                    "Using existing identity"
                );
                return Ok(identity);
            }
            Err(reason) => {
                warn!(cert = %cert_path.display(), %reason, "Existing identity unusable, regenerating");
            }
        }
    } else if key_exists || cert_exists {
        warn!(
            key = %key_path.display(),
            cert = %cert_path.display(),
            "Only one identity file present, regenerating both"
        );
    }

    info!("Generating self-signed identity");
    let (key_pem, cert_pem) = generate_self_signed(OffsetDateTime::now_utc())?;

    write_pem(key_path, &key_pem)?;
    write_pem(cert_path, &cert_pem)?;

    let identity = Identity::new(key_path, cert_path, key_pem, cert_pem)?;
    info!(
        key = %key_path.display(),
        cert = %cert_path.display(),
        fingerprint = %identity.fingerprint(),
        "Identity generated"
    );
    Ok(identity)
}

/// SHA-256 fingerprint of a DER certificate as colon-separated uppercase hex
pub fn certificate_fingerprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hasher
        .finalize()
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(":")
}

/// Generate an RSA-2048 key and a certificate valid from `not_before` for ten years
fn generate_self_signed(not_before: OffsetDateTime) -> Result<(String, String), IdentityError> {
    let key_pair =
        KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256).map_err(IdentityError::KeyGeneration)?;

    let mut params = CertificateParams::new(vec![]).map_err(IdentityError::Certificate)?;

    let mut subject = DistinguishedName::new();
    subject.push(DnType::CountryName, CERT_COUNTRY);
    subject.push(DnType::StateOrProvinceName, CERT_STATE);
    subject.push(DnType::LocalityName, CERT_LOCALITY);
    subject.push(DnType::OrganizationName, CERT_ORGANIZATION);
    subject.push(DnType::OrganizationalUnitName, CERT_ORGANIZATIONAL_UNIT);
    subject.push(DnType::CommonName, CERT_COMMON_NAME);
    params.distinguished_name = subject;

    params.serial_number = Some(SerialNumber::from(CERT_SERIAL_NUMBER));
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(CERT_VALIDITY_DAYS);

    let cert = params
        .self_signed(&key_pair)
        .map_err(IdentityError::Certificate)?;

    Ok((key_pair.serialize_pem(), cert.pem()))
}

/// Check that the pair can be used as-is
fn validate_pair(key_pem: &str, cert_pem: &str) -> Result<(), String> {
    let cert_block = pem::parse(cert_pem).map_err(|e| format!("certificate: {e}"))?;
    if cert_block.tag() != "CERTIFICATE" {
        return Err(format!("unexpected PEM block {}", cert_block.tag()));
    }

    let (_, cert) = x509_parser::parse_x509_certificate(cert_block.contents())
        .map_err(|e| format!("certificate: {e}"))?;

    if !cert.validity().is_valid() {
        return Err("certificate is expired or not yet valid".to_string());
    }

    let key_pair = KeyPair::from_pem(key_pem).map_err(|e| format!("private key: {e}"))?;
    if *cert.public_key().subject_public_key.data != *key_pair.public_key_raw() {
        return Err("certificate does not belong to the private key".to_string());
    }

    Ok(())
}

fn read_pem(path: &Path) -> Result<String, IdentityError> {
    fs::read_to_string(path).map_err(|source| IdentityError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write_pem(path: &Path, contents: &str) -> Result<(), IdentityError> {
    let write_err = |source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    fs::write(path, contents).map_err(write_err)?;
    #[cfg(unix)]
    set_secure_permissions(path).map_err(write_err)?;
    Ok(())
}

/// Restrict a file to its owner (0600)
#[cfg(unix)]
fn set_secure_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o600);
    fs::set_permissions(path, permissions)
}
