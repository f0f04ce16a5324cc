//! Reading installed certificate material.

use std::path::Path;

use chrono::{DateTime, Utc};
use x509_parser::pem::parse_x509_pem;

use portico_common::domain::{CertPaths, DomainName};

use crate::CertError;

/// `notAfter` of the first certificate in a PEM bundle (the leaf, for a
/// fullchain).
pub fn parse_expiry(pem: &[u8]) -> Result<DateTime<Utc>, CertError> {
    let (_, pem) = parse_x509_pem(pem)
        .map_err(|e| CertError::Failed(format!("failed to parse PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertError::Failed(format!("failed to parse X.509 certificate: {e}")))?;

    let not_after = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| CertError::Failed(format!("invalid notAfter timestamp {not_after}")))
}

pub fn read_expiry(fullchain: &Path) -> Result<DateTime<Utc>, CertError> {
    let bytes = std::fs::read(fullchain)?;
    parse_expiry(&bytes)
}

/// Expiry of the certificate installed for `domain`, if there is one that
/// parses.
pub fn installed_expiry(store_root: &Path, domain: &DomainName) -> Option<DateTime<Utc>> {
    let paths = CertPaths::for_domain(store_root, domain);
    if !paths.installed() {
        return None;
    }
    match read_expiry(&paths.fullchain) {
        Ok(expiry) => Some(expiry),
        Err(e) => {
            tracing::warn!(domain = %domain, error = %e, "Installed certificate unreadable");
            None
        }
    }
}

/// Owner-only permissions on the private key (Unix only).
///
/// certbot's `live/` entries are symlinks into `archive/`; permissions
/// apply to the target.
pub fn restrict_key(private_key: &Path) -> Result<(), CertError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(private_key, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = private_key;
    Ok(())
}
