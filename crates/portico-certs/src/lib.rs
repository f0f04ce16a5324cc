//! Portico Certs: TLS certificates for custom domains.
//!
//! Issuance goes through an ACME client (certbot, HTTP-01 over the shared
//! webroot). The store layout is certbot's `live/<domain>/` lineage, which
//! is also what the vhost renderer points nginx at.

mod certbot;
pub mod certfiles;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use portico_common::domain::{CertPaths, DomainName};

pub use certbot::{CertbotIssuer, CertbotOptions};

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("certificate authority rate limit reached: {0}")]
    RateLimited(String),

    #[error("ACME challenge failed: {0}")]
    ChallengeFailed(String),

    #[error("certificate issuance timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("certificate issuance failed: {0}")]
    Failed(String),

    #[error("certificate io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An installed certificate lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub expiry: DateTime<Utc>,
    pub paths: CertPaths,
}

/// Seam between the controller and the certificate authority.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Obtain (or renew) a certificate for `domain` and install it. The
    /// lineage is named after `domain`; `alt_names` are added to it and
    /// must each pass the HTTP-01 challenge too.
    async fn issue(
        &self,
        domain: &DomainName,
        alt_names: &[DomainName],
    ) -> Result<IssuedCertificate, CertError>;

    /// Delete the lineage for `domain`. `Ok(false)` when there was none.
    async fn remove(&self, domain: &DomainName) -> Result<bool, CertError>;
}

/// True when `expiry` falls within `threshold_days` of `now`.
pub fn renewal_due(expiry: DateTime<Utc>, now: DateTime<Utc>, threshold_days: i64) -> bool {
    expiry - now <= Duration::days(threshold_days)
}
