//! A controller wired to scripted DNS, proxy and certificate doubles over
//! a scratch directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use portico_certs::testing::ScriptedIssuer;
use portico_common::domain::DomainName;
use portico_common::persist::scratch_dir;
use portico_dns::testing::ScriptedLookup;
use portico_dns::DnsVerifier;
use portico_proxy::testing::ScriptedControl;
use portico_proxy::{ProxyApplier, ReloadGate, VhostTemplate};

use crate::{ControllerParts, DomainConfig, ProvisioningController, StatusStore, Workspace, WorkspaceRegistry};

pub const INGRESS_IP: &str = "203.0.113.10";
pub const BASE_DOMAIN: &str = "example-platform.com";
pub const OWNER: &str = "user-1";

pub struct Harness {
    pub root: PathBuf,
    pub lookup: Arc<ScriptedLookup>,
    pub control: Arc<ScriptedControl>,
    pub issuer: Arc<ScriptedIssuer>,
    pub controller: Arc<ProvisioningController>,
}

impl Harness {
    pub fn new() -> Self {
        let root = scratch_dir("provision");
        let lookup = Arc::new(ScriptedLookup::new());
        let control = Arc::new(ScriptedControl::new());
        let gate = Arc::new(ReloadGate::new(control.clone()));
        let cert_root = root.join("certs");
        let issuer = Arc::new(ScriptedIssuer::new(cert_root.clone()));

        let controller = ProvisioningController::new(ControllerParts {
            dns: DnsVerifier::new(
                lookup.clone(),
                vec![INGRESS_IP.parse().unwrap()],
                Duration::from_secs(1),
            ),
            proxy: ProxyApplier::new(root.join("sites"), root.join("staging"), gate),
            issuer: issuer.clone(),
            template: VhostTemplate {
                backend_upstream: "127.0.0.1:8000".to_string(),
                api_prefix: "/api/".to_string(),
                frontend_root: PathBuf::from("/var/www/app/dist"),
                acme_webroot: root.join("acme"),
                cert_store_root: cert_root,
            },
            base_domain: DomainName::parse(BASE_DOMAIN).unwrap(),
            include_www: true,
            statuses: StatusStore::load(&root.join("state").join("domains.json")).unwrap(),
            workspaces: WorkspaceRegistry::load(&root.join("state").join("workspaces.json"))
                .unwrap(),
        });

        Self {
            root,
            lookup,
            control,
            issuer,
            controller: Arc::new(controller),
        }
    }

    pub fn vhost_path(&self, domain: &str) -> PathBuf {
        self.root.join("sites").join(format!("{domain}.conf"))
    }

    pub fn vhost(&self, domain: &str) -> Option<String> {
        std::fs::read_to_string(self.vhost_path(domain)).ok()
    }

    /// Point `domain` at the platform ingress.
    pub fn point_dns(&self, domain: &str) {
        self.lookup.point(&DomainName::parse(domain).unwrap(), INGRESS_IP);
    }

    pub fn point_dns_elsewhere(&self, domain: &str) {
        self.lookup.point(&DomainName::parse(domain).unwrap(), "198.51.100.7");
    }

    pub async fn custom_workspace(&self, domain: &str) -> Workspace {
        self.controller
            .create_workspace(
                domain,
                OWNER,
                DomainConfig::CustomDomain {
                    domain: DomainName::parse(domain).unwrap(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn subdomain_workspace(&self, subdomain: &str) -> Workspace {
        self.controller
            .create_workspace(
                subdomain,
                OWNER,
                DomainConfig::Subdomain {
                    subdomain: subdomain.to_string(),
                },
            )
            .await
            .unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
