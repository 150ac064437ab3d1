//! TLS keypair provisioning for the API server.
//!
//! Implements the "generate iff incomplete" policy: operator-provided
//! material on disk is authoritative and never overwritten, but if either
//! file of the pair is missing a fresh self-signed keypair is synthesized
//! from the configured certificate profile and written to both paths
//! together, so the pair on disk is always internally consistent.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{TlsPaths, TlsProfile};

/// TLS provisioning error
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("Failed to write {}: {}", path.display(), source)]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to load TLS material: {0}")]
    Load(#[from] io::Error),
}

/// Ensure a servable certificate/key pair exists at the configured paths.
///
/// If both files already exist they are treated as authoritative and used
/// as-is. If either is missing, a self-signed pair is generated and both
/// files are (re)written. A failure leaves no partial pair behind.
pub fn provision(paths: &TlsPaths, profile: &TlsProfile) -> Result<(), TlsError> {
    if paths.certificate.exists() && paths.key.exists() {
        tracing::info!(path = %paths.key.display(), "Loading TLS key");
        tracing::info!(path = %paths.certificate.display(), "Loading TLS certificate");
        return Ok(());
    }

    tracing::info!(path = %paths.key.display(), "Generating TLS key");
    tracing::info!(path = %paths.certificate.display(), "Generating TLS certificate");

    let (cert_pem, key_pem) = generate_self_signed(profile)?;

    write_pem(&paths.certificate, &cert_pem)?;
    if let Err(err) = write_pem(&paths.key, &key_pem) {
        // Never leave a half-written pair servable.
        let _ = std::fs::remove_file(&paths.certificate);
        return Err(err);
    }

    Ok(())
}

/// Generate a self-signed certificate and key as PEM strings.
fn generate_self_signed(profile: &TlsProfile) -> Result<(String, String), TlsError> {
    let mut params = CertificateParams::new(vec![profile.common_name.clone()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, profile.common_name.clone());
    dn.push(DnType::OrganizationName, profile.organization.clone());
    if !profile.organizational_unit.is_empty() {
        dn.push(
            DnType::OrganizationalUnitName,
            profile.organizational_unit.clone(),
        );
    }
    dn.push(DnType::CountryName, profile.country.clone());
    if !profile.locality.is_empty() {
        dn.push(DnType::LocalityName, profile.locality.clone());
    }
    params.distinguished_name = dn;

    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after = params.not_before + time::Duration::days(profile.validity_days);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

fn write_pem(path: &Path, pem: &str) -> Result<(), TlsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TlsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, pem).map_err(|source| TlsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
