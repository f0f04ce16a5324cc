//! Portico DNS: checks that a custom domain is delegated to the platform.
//!
//! A domain is verified when any of its address records equals one of the
//! platform's published ingress IPs. Lookup problems are ordinary negative
//! results: [`DnsVerifier::verify`] never fails, it reports.

mod resolver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use portico_common::domain::DomainName;

pub use resolver::SystemLookup;

/// Why a lookup produced no addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupFailure {
    /// NXDOMAIN or an empty answer.
    #[error("no address records")]
    NoRecords,
    #[error("{0}")]
    Failed(String),
}

/// Seam between the verifier and the network.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, domain: &DomainName) -> Result<Vec<IpAddr>, LookupFailure>;
}

/// Classification of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DnsOutcome {
    Matched,
    NoRecords,
    WrongAddress,
    TimedOut,
    LookupFailed,
}

/// Result of checking one domain.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DnsCheck {
    pub verified: bool,
    pub observed_addresses: Vec<String>,
    pub message: String,
    pub outcome: DnsOutcome,
}

impl DnsCheck {
    /// Check result for a name the platform owns (subdomains).
    pub fn platform_owned(domain: &DomainName) -> Self {
        Self {
            verified: true,
            observed_addresses: Vec::new(),
            message: format!("{domain} is a platform subdomain; no DNS verification needed"),
            outcome: DnsOutcome::Matched,
        }
    }
}

pub struct DnsVerifier {
    lookup: Arc<dyn AddressLookup>,
    ingress_ips: Vec<IpAddr>,
    timeout: Duration,
}

impl DnsVerifier {
    pub fn new(lookup: Arc<dyn AddressLookup>, ingress_ips: Vec<IpAddr>, timeout: Duration) -> Self {
        Self {
            lookup,
            ingress_ips,
            timeout,
        }
    }

    pub fn ingress_ips(&self) -> &[IpAddr] {
        &self.ingress_ips
    }

    pub async fn verify(&self, domain: &DomainName) -> DnsCheck {
        let result = tokio::time::timeout(self.timeout, self.lookup.lookup(domain)).await;
        let check = match result {
            Err(_) => DnsCheck {
                verified: false,
                observed_addresses: Vec::new(),
                message: format!(
                    "DNS lookup for {domain} timed out after {}s",
                    self.timeout.as_secs()
                ),
                outcome: DnsOutcome::TimedOut,
            },
            Ok(Err(LookupFailure::NoRecords)) => self.no_records(domain),
            Ok(Err(LookupFailure::Failed(e))) => DnsCheck {
                verified: false,
                observed_addresses: Vec::new(),
                message: format!("DNS lookup for {domain} failed: {e}"),
                outcome: DnsOutcome::LookupFailed,
            },
            Ok(Ok(addrs)) if addrs.is_empty() => self.no_records(domain),
            Ok(Ok(addrs)) => self.compare(domain, addrs),
        };

        tracing::debug!(
            domain = %domain,
            verified = check.verified,
            outcome = ?check.outcome,
            "DNS check complete"
        );
        check
    }

    fn compare(&self, domain: &DomainName, mut addrs: Vec<IpAddr>) -> DnsCheck {
        addrs.sort();
        addrs.dedup();
        let observed: Vec<String> = addrs.iter().map(|ip| ip.to_string()).collect();

        match addrs.iter().find(|ip| self.ingress_ips.contains(ip)) {
            Some(matched) => DnsCheck {
                verified: true,
                message: format!("DNS verified: {domain} resolves to {matched}"),
                observed_addresses: observed,
                outcome: DnsOutcome::Matched,
            },
            None => DnsCheck {
                verified: false,
                message: format!(
                    "{domain} resolves to {}, expected {}",
                    observed.join(", "),
                    self.expected()
                ),
                observed_addresses: observed,
                outcome: DnsOutcome::WrongAddress,
            },
        }
    }

    fn no_records(&self, domain: &DomainName) -> DnsCheck {
        DnsCheck {
            verified: false,
            observed_addresses: Vec::new(),
            message: format!(
                "No address records found for {domain}; add an A record pointing to {}",
                self.expected()
            ),
            outcome: DnsOutcome::NoRecords,
        }
    }

    fn expected(&self) -> String {
        self.ingress_ips
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}
