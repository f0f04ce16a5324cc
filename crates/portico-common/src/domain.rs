//! Validated domain names and the certificate paths derived from them.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maximum length of a full domain name (RFC 1035).
const DOMAIN_MAX_LEN: usize = 253;
/// Maximum length of a single label (RFC 1035).
const LABEL_MAX_LEN: usize = 63;

/// Error parsing a domain name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,

    #[error("domain is too long ({0} characters, max 253)")]
    TooLong(usize),

    #[error("'{0}' is an IP address, not a domain name")]
    IpLiteral(String),

    #[error("'{0}' needs at least two labels (e.g. example.com)")]
    SingleLabel(String),

    #[error("invalid label '{label}' in '{domain}'")]
    InvalidLabel { domain: String, label: String },
}

/// A lowercase, dot-separated hostname without a trailing dot.
///
/// Accepts liberal input (`"Shop.Example.COM."`, surrounding whitespace)
/// and stores the canonical form. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let s = input.trim().trim_end_matches('.').to_ascii_lowercase();
        if s.is_empty() {
            return Err(DomainError::Empty);
        }
        if s.len() > DOMAIN_MAX_LEN {
            return Err(DomainError::TooLong(s.len()));
        }
        if s.parse::<IpAddr>().is_ok() {
            return Err(DomainError::IpLiteral(s));
        }

        let labels: Vec<&str> = s.split('.').collect();
        if labels.len() < 2 {
            return Err(DomainError::SingleLabel(s));
        }
        for label in &labels {
            if !is_valid_label(label) {
                return Err(DomainError::InvalidLabel {
                    domain: s.clone(),
                    label: (*label).to_string(),
                });
            }
        }
        if labels
            .last()
            .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(DomainError::InvalidLabel {
                domain: s.clone(),
                label: labels[labels.len() - 1].to_string(),
            });
        }

        Ok(DomainName(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `www.` variant served alongside the apex. A name that already
    /// starts with `www.` is its own variant.
    pub fn www(&self) -> String {
        if self.0.starts_with("www.") {
            self.0.clone()
        } else {
            format!("www.{}", self.0)
        }
    }

    /// True when this name is `base` itself or a name beneath it.
    pub fn is_within(&self, base: &DomainName) -> bool {
        self.0 == base.0 || self.0.ends_with(&format!(".{}", base.0))
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= LABEL_MAX_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DomainName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DomainName::parse(&value)
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0
    }
}

/// Certificate material locations for one domain inside the certificate
/// store. The layout matches certbot's `live/<cert-name>/` lineage so the
/// renderer and the issuer agree without talking to each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub dir: PathBuf,
    pub fullchain: PathBuf,
    pub private_key: PathBuf,
}

impl CertPaths {
    pub fn for_domain(store_root: &Path, domain: &DomainName) -> Self {
        let dir = store_root.join("live").join(domain.as_str());
        Self {
            fullchain: dir.join("fullchain.pem"),
            private_key: dir.join("privkey.pem"),
            dir,
        }
    }

    /// Both the chain and the key are present on disk.
    pub fn installed(&self) -> bool {
        self.fullchain.is_file() && self.private_key.is_file()
    }
}
