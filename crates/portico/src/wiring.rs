//! Builds the controller and its collaborators from [`Settings`].

use std::sync::Arc;

use portico_certs::{CertbotIssuer, CertbotOptions};
use portico_config::Settings;
use portico_dns::{DnsVerifier, SystemLookup};
use portico_proxy::{NginxControl, ProxyApplier, ReloadGate, VhostTemplate};
use portico_provision::{ControllerParts, ProvisioningController, RenewalRuntime, StatusStore, WorkspaceRegistry};

pub fn vhost_template(settings: &Settings) -> VhostTemplate {
    VhostTemplate {
        backend_upstream: settings.proxy.backend_upstream.clone(),
        api_prefix: settings.proxy.api_prefix.clone(),
        frontend_root: settings.proxy.frontend_root.clone(),
        acme_webroot: settings.proxy.acme_webroot.clone(),
        cert_store_root: settings.certs.store_root(),
    }
}

pub fn dns_verifier(settings: &Settings) -> DnsVerifier {
    DnsVerifier::new(
        Arc::new(SystemLookup::new()),
        settings.platform.ingress_ips.clone(),
        settings.dns.timeout(),
    )
}

pub fn build_controller(settings: &Settings) -> anyhow::Result<Arc<ProvisioningController>> {
    let control = Arc::new(NginxControl::new(
        settings.proxy.nginx_binary.clone(),
        settings.proxy.reload_command.clone(),
        settings.proxy.command_timeout(),
    ));
    // certbot's deploy reload and vhost promotion share one gate.
    let gate = Arc::new(ReloadGate::new(control));

    let sites_dir = settings.proxy.sites_dir();
    let staging_dir = settings.proxy.staging_dir();
    std::fs::create_dir_all(&sites_dir)?;
    std::fs::create_dir_all(&staging_dir)?;

    let issuer = CertbotIssuer::new(
        CertbotOptions {
            certbot_binary: settings.certs.certbot_binary.clone(),
            acme_webroot: settings.proxy.acme_webroot.clone(),
            store_root: settings.certs.store_root(),
            contact_email: settings.certs.contact_email.clone(),
            staging: settings.certs.staging,
            timeout: settings.certs.issue_timeout(),
        },
        gate.clone(),
    );

    let statuses = StatusStore::load(&settings.store.status_path())?;
    let workspaces = WorkspaceRegistry::load(&settings.store.workspaces_path())?;

    let controller = ProvisioningController::new(ControllerParts {
        dns: dns_verifier(settings),
        proxy: ProxyApplier::new(sites_dir, staging_dir, gate),
        issuer: Arc::new(issuer),
        template: vhost_template(settings),
        base_domain: settings.base_domain()?,
        include_www: settings.certs.include_www,
        statuses,
        workspaces,
    });
    Ok(Arc::new(controller))
}

pub fn renewal_runtime(settings: &Settings, controller: Arc<ProvisioningController>) -> RenewalRuntime {
    RenewalRuntime::new(
        controller,
        settings.certs.renewal_interval(),
        settings.certs.renewal_threshold_days,
    )
}
