use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, TokioResolver};

use portico_common::domain::DomainName;

use crate::{AddressLookup, LookupFailure};

/// Address lookup through the host's resolver configuration.
pub struct SystemLookup {
    resolver: TokioResolver,
}

impl SystemLookup {
    /// Build from `/etc/resolv.conf` (or the platform equivalent). Falls
    /// back to the default public upstreams when that cannot be read.
    pub fn new() -> Self {
        let resolver = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                tracing::warn!(error = %e, "System resolver config unavailable, using defaults");
                Resolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver }
    }
}

impl Default for SystemLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressLookup for SystemLookup {
    async fn lookup(&self, domain: &DomainName) -> Result<Vec<IpAddr>, LookupFailure> {
        // Fully qualified so search domains never apply.
        let fqdn = format!("{}.", domain.as_str());
        match self.resolver.lookup_ip(fqdn.as_str()).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(e) if e.is_no_records_found() || e.is_nx_domain() => Err(LookupFailure::NoRecords),
            Err(e) => Err(LookupFailure::Failed(e.to_string())),
        }
    }
}
