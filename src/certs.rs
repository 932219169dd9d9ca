use std::fmt;
use std::path::{Path, PathBuf};

use ring::digest;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::BearerSession;
use crate::error::{BootstrapError, CertArtifact, Result};
use crate::fs_util;
use crate::openbao::{IssueRequest, OpenBaoClient};

/// Locations of the three artifacts of one certificate bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl CertPaths {
    #[must_use]
    pub fn in_dir(dir: &Path, cert: &str, key: &str, ca: &str) -> Self {
        Self {
            cert: dir.join(cert),
            key: dir.join(key),
            ca: dir.join(ca),
        }
    }

    fn artifacts(&self) -> [(CertArtifact, &Path); 3] {
        [
            (CertArtifact::Certificate, self.cert.as_path()),
            (CertArtifact::PrivateKey, self.key.as_path()),
            (CertArtifact::CaChain, self.ca.as_path()),
        ]
    }
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedCertificates {
    pub paths: CertPaths,
    pub not_after: Option<OffsetDateTime>,
    pub fingerprint: Option<String>,
}

/// Issued certificate material held in memory until persisted.
#[derive(Clone)]
pub struct CertificateBundle {
    pub certificate: String,
    pub private_key: String,
    pub ca_chain: String,
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("ca_chain_len", &self.ca_chain.len())
            .finish()
    }
}

/// Checks that all three artifacts exist and are readable.
///
/// `hint` names the step that generates the material and is included in the
/// error. An expired certificate is reported but not rejected.
///
/// # Errors
/// Returns [`BootstrapError::CertMissing`] for the first absent or
/// unreadable artifact.
pub async fn validate_bundle(paths: &CertPaths, hint: &str) -> Result<ValidatedCertificates> {
    let mut cert_bytes = Vec::new();
    for (artifact, path) in paths.artifacts() {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|err| BootstrapError::CertMissing {
                artifact,
                path: path.to_path_buf(),
                hint: format!("{err}; {hint}"),
            })?;
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Err(BootstrapError::CertMissing {
                artifact,
                path: path.to_path_buf(),
                hint: format!("file is empty; {hint}"),
            });
        }
        if artifact == CertArtifact::Certificate {
            cert_bytes = contents;
        }
    }

    let (not_after, fingerprint) = match parse_cert_not_after(&cert_bytes) {
        Ok(not_after) => {
            if not_after <= OffsetDateTime::now_utc() {
                warn!(
                    "Certificate {} expired at {not_after}; continuing with it",
                    paths.cert.display()
                );
            }
            (Some(not_after), pem_fingerprint(&cert_bytes))
        }
        Err(err) => {
            warn!("Certificate {} is not parseable: {err}", paths.cert.display());
            (None, None)
        }
    };
    info!(
        "Validated certificate bundle (cert={}, not_after={not_after:?}, sha256={})",
        paths.cert.display(),
        fingerprint.as_deref().unwrap_or("unknown")
    );
    Ok(ValidatedCertificates {
        paths: paths.clone(),
        not_after,
        fingerprint,
    })
}

/// Requests a certificate from a PKI role with the active session.
///
/// # Errors
/// Returns [`BootstrapError::IssuanceFailed`] if the request is rejected or
/// the response lacks any of the three artifacts.
pub async fn issue(
    client: &OpenBaoClient,
    session: &BearerSession,
    mount: &str,
    role: &str,
    request: &IssueRequest,
) -> Result<CertificateBundle> {
    let response = client
        .issue_certificate(session, mount, role, request)
        .await
        .map_err(|err| BootstrapError::issuance_failed(&request.common_name, err.to_string()))?;
    let data = response.data;
    let ca_chain = if data.ca_chain.is_empty() {
        data.issuing_ca
    } else {
        data.ca_chain.join("\n")
    };
    for (value, artifact) in [
        (&data.certificate, CertArtifact::Certificate),
        (&data.private_key, CertArtifact::PrivateKey),
        (&ca_chain, CertArtifact::CaChain),
    ] {
        if value.trim().is_empty() {
            return Err(BootstrapError::issuance_failed(
                &request.common_name,
                format!("response has no {artifact}"),
            ));
        }
    }
    info!(
        "Issued certificate for {} (serial={}, ttl={})",
        request.common_name,
        data.serial_number.as_deref().unwrap_or("unknown"),
        request.ttl
    );
    Ok(CertificateBundle {
        certificate: with_trailing_newline(data.certificate),
        private_key: with_trailing_newline(data.private_key),
        ca_chain: with_trailing_newline(ca_chain),
    })
}

/// Writes the bundle: key owner-only, certificate and chain world-readable.
///
/// # Errors
/// Returns [`BootstrapError::IssuanceFailed`] if any file cannot be written.
pub async fn persist(bundle: &CertificateBundle, paths: &CertPaths, label: &str) -> Result<()> {
    let fail = |err: anyhow::Error| BootstrapError::issuance_failed(label, format!("{err:#}"));
    for path in [&paths.cert, &paths.key, &paths.ca] {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs_util::ensure_dir(parent, fs_util::PUBLIC_DIR_MODE)
                .await
                .map_err(fail)?;
        }
    }
    fs_util::write_owner_only(&paths.key, bundle.private_key.as_bytes())
        .await
        .map_err(fail)?;
    fs_util::write_public(&paths.cert, bundle.certificate.as_bytes())
        .await
        .map_err(fail)?;
    fs_util::write_public(&paths.ca, bundle.ca_chain.as_bytes())
        .await
        .map_err(fail)?;
    info!(
        "Wrote certificate bundle for {label} to {}",
        paths.cert.parent().unwrap_or(Path::new(".")).display()
    );
    Ok(())
}

/// Reads the expiry of the first certificate in a PEM document.
///
/// # Errors
/// Returns an error if the certificate cannot be parsed.
pub fn parse_cert_not_after(cert_bytes: &[u8]) -> anyhow::Result<OffsetDateTime> {
    let pem = x509_parser::pem::parse_x509_pem(cert_bytes)
        .map_err(|e| anyhow::anyhow!("Failed to parse PEM certificate: {e}"))?
        .1;
    let (_, cert) = x509_parser::parse_x509_certificate(&pem.contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse X509 certificate: {e}"))?;
    Ok(cert.validity().not_after.to_datetime())
}

fn pem_fingerprint(cert_bytes: &[u8]) -> Option<String> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_bytes).ok()?;
    Some(sha256_hex(&pem.contents))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, bytes);
    let mut output = String::with_capacity(64);
    for byte in digest.as_ref() {
        use std::fmt::Write;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

fn with_trailing_newline(mut value: String) -> String {
    if !value.ends_with('\n') {
        value.push('\n');
    }
    value
}
