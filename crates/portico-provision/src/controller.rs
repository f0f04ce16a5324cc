use std::sync::Arc;

use chrono::Utc;

use portico_certs::CertificateIssuer;
use portico_common::domain::{CertPaths, DomainName};
use portico_dns::{DnsCheck, DnsVerifier};
use portico_proxy::{render, ProxyApplier, TlsStage, VhostTemplate};

use crate::error::ProvisionError;
use crate::lock::{LockTable, WorkspaceLock};
use crate::state::ProvisioningState;
use crate::status::{DomainStatus, StatusStore};
use crate::steps::{DomainStatusView, ProvisionReport, ProvisionStep, SetupReport, StepResult};
use crate::workspace::{DomainConfig, Workspace, WorkspaceRegistry};

/// Everything the controller drives.
pub struct ControllerParts {
    pub dns: DnsVerifier,
    pub proxy: ProxyApplier,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub template: VhostTemplate,
    pub base_domain: DomainName,
    /// Add `www.` to certificates when it resolves to the ingress.
    pub include_www: bool,
    pub statuses: StatusStore,
    pub workspaces: WorkspaceRegistry,
}

/// Moves custom domains through DNS verification, proxy configuration
/// and certificate issuance, one workspace at a time.
pub struct ProvisioningController {
    dns: DnsVerifier,
    proxy: ProxyApplier,
    issuer: Arc<dyn CertificateIssuer>,
    template: VhostTemplate,
    base_domain: DomainName,
    include_www: bool,
    statuses: StatusStore,
    workspaces: WorkspaceRegistry,
    locks: LockTable,
}

impl ProvisioningController {
    pub fn new(parts: ControllerParts) -> Self {
        Self {
            dns: parts.dns,
            proxy: parts.proxy,
            issuer: parts.issuer,
            template: parts.template,
            base_domain: parts.base_domain,
            include_www: parts.include_www,
            statuses: parts.statuses,
            workspaces: parts.workspaces,
            locks: LockTable::new(),
        }
    }

    pub fn base_domain(&self) -> &DomainName {
        &self.base_domain
    }

    pub(crate) fn status_store(&self) -> &StatusStore {
        &self.statuses
    }

    pub(crate) fn workspace_registry(&self) -> &WorkspaceRegistry {
        &self.workspaces
    }

    // ── Lookup helpers ──────────────────────────────────────────────

    async fn workspace(&self, workspace_id: &str) -> Result<Workspace, ProvisionError> {
        self.workspaces
            .get(workspace_id)
            .await
            .ok_or_else(|| ProvisionError::WorkspaceNotFound(workspace_id.to_string()))
    }

    /// The workspace and its custom domain; subdomain workspaces are an
    /// input error for every operation that touches the proxy.
    async fn custom_target(
        &self,
        workspace_id: &str,
    ) -> Result<(Workspace, DomainName), ProvisionError> {
        let ws = self.workspace(workspace_id).await?;
        match ws.domain.custom_domain() {
            Some(domain) => {
                let domain = domain.clone();
                Ok((ws, domain))
            }
            None => Err(ProvisionError::NoCustomDomain(workspace_id.to_string())),
        }
    }

    fn lock<'a>(&'a self, workspace_id: &str) -> Result<WorkspaceLock<'a>, ProvisionError> {
        self.locks.try_acquire(workspace_id).ok_or_else(|| {
            tracing::debug!(workspace_id, "Operation rejected, workspace busy");
            ProvisionError::InProgress(workspace_id.to_string())
        })
    }

    /// Input errors come first, then the lock. The workspace is read again
    /// under the lock so a domain swapped in the meantime is the one used.
    async fn locked_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<(WorkspaceLock<'_>, Workspace), ProvisionError> {
        self.workspace(workspace_id).await?;
        let lock = self.lock(workspace_id)?;
        let ws = self.workspace(workspace_id).await?;
        Ok((lock, ws))
    }

    async fn locked_custom_target(
        &self,
        workspace_id: &str,
    ) -> Result<(WorkspaceLock<'_>, DomainName), ProvisionError> {
        self.custom_target(workspace_id).await?;
        let lock = self.lock(workspace_id)?;
        let (_, domain) = self.custom_target(workspace_id).await?;
        Ok((lock, domain))
    }

    fn tls_stage(&self, domain: &DomainName) -> TlsStage {
        if CertPaths::for_domain(&self.template.cert_store_root, domain).installed() {
            TlsStage::Active
        } else {
            TlsStage::Pending
        }
    }

    /// A custom domain may belong to one workspace only and may not sit
    /// under the platform's own base domain.
    async fn check_domain_available(
        &self,
        domain: &DomainName,
        except: Option<&str>,
    ) -> Result<(), ProvisionError> {
        if domain.is_within(&self.base_domain) {
            return Err(ProvisionError::InvalidDomain(format!(
                "{domain} is under the platform domain {}; use a subdomain instead",
                self.base_domain
            )));
        }
        if let Some(owner) = self.workspaces.find_by_hostname(domain, &self.base_domain).await {
            if Some(owner.id.as_str()) != except {
                return Err(ProvisionError::DomainTaken {
                    domain: domain.to_string(),
                    workspace_id: owner.id,
                });
            }
        }
        Ok(())
    }

    // ── Workspaces ──────────────────────────────────────────────────

    /// Register a workspace. Custom domains get a fresh status record.
    pub async fn create_workspace(
        &self,
        name: &str,
        owner_id: &str,
        domain: DomainConfig,
    ) -> Result<Workspace, ProvisionError> {
        if name.trim().is_empty() {
            return Err(ProvisionError::InvalidRequest("workspace name is empty".into()));
        }
        if owner_id.trim().is_empty() {
            return Err(ProvisionError::InvalidRequest("owner id is empty".into()));
        }
        self.validate_config(&domain, None).await?;

        let ws = self
            .workspaces
            .create(name.trim(), owner_id.trim(), domain, &self.base_domain)
            .await?;
        if let Some(custom) = ws.domain.custom_domain() {
            self.statuses
                .put(DomainStatus::new(&ws.id, custom.clone()))
                .await?;
        }
        Ok(ws)
    }

    async fn validate_config(
        &self,
        config: &DomainConfig,
        except: Option<&str>,
    ) -> Result<(), ProvisionError> {
        let hostname = config.hostname(&self.base_domain)?;
        match config {
            DomainConfig::CustomDomain { domain } => {
                self.check_domain_available(domain, except).await
            }
            DomainConfig::Subdomain { .. } => {
                match self.workspaces.find_by_hostname(&hostname, &self.base_domain).await {
                    Some(owner) if Some(owner.id.as_str()) != except => {
                        Err(ProvisionError::DomainTaken {
                            domain: hostname.to_string(),
                            workspace_id: owner.id,
                        })
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Swap a workspace's domain config: tear down what the old custom
    /// domain had, drop its status, attach the new config.
    pub async fn change_domain(
        &self,
        workspace_id: &str,
        config: DomainConfig,
    ) -> Result<Workspace, ProvisionError> {
        let ws = self.workspace(workspace_id).await?;
        if ws.domain == config {
            return Ok(ws);
        }
        self.validate_config(&config, Some(workspace_id)).await?;
        let (_lock, ws) = self.locked_workspace(workspace_id).await?;
        if ws.domain == config {
            return Ok(ws);
        }

        if let Some(old) = ws.domain.custom_domain() {
            self.teardown(workspace_id, old).await?;
        }
        self.statuses.remove(workspace_id).await?;
        let updated = match self
            .workspaces
            .set_domain(workspace_id, config, &self.base_domain)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(ProvisionError::WorkspaceNotFound(workspace_id.to_string())),
            Err(e) => {
                // The old config is torn down; its record starts over.
                if let Some(old) = ws.domain.custom_domain() {
                    self.statuses
                        .put(DomainStatus::new(workspace_id, old.clone()))
                        .await?;
                }
                return Err(e.into());
            }
        };
        if let Some(custom) = updated.domain.custom_domain() {
            self.statuses
                .put(DomainStatus::new(workspace_id, custom.clone()))
                .await?;
        }

        tracing::info!(workspace_id, "Workspace domain changed");
        Ok(updated)
    }

    /// Remove a workspace together with its status and platform config.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<(), ProvisionError> {
        let (_lock, ws) = self.locked_workspace(workspace_id).await?;

        if let Some(domain) = ws.domain.custom_domain() {
            self.teardown(workspace_id, domain).await?;
        }
        self.statuses.remove(workspace_id).await?;
        self.workspaces.remove(workspace_id).await?;
        tracing::info!(workspace_id, "Workspace deleted");
        Ok(())
    }

    async fn teardown(&self, workspace_id: &str, domain: &DomainName) -> Result<(), ProvisionError> {
        let step = self.remove_step(workspace_id, domain).await?;
        if step.success {
            Ok(())
        } else {
            Err(ProvisionError::TeardownFailed(step.message))
        }
    }

    // ── DNS ─────────────────────────────────────────────────────────

    /// Check delegation and record the outcome under the workspace lock.
    pub async fn verify_dns(&self, workspace_id: &str) -> Result<DnsCheck, ProvisionError> {
        let (_lock, ws) = self.locked_workspace(workspace_id).await?;
        match &ws.domain {
            DomainConfig::Subdomain { .. } => {
                let host = ws.domain.hostname(&self.base_domain)?;
                Ok(DnsCheck::platform_owned(&host))
            }
            DomainConfig::CustomDomain { domain } => self.check_dns(workspace_id, domain).await,
        }
    }

    async fn check_dns(
        &self,
        workspace_id: &str,
        domain: &DomainName,
    ) -> Result<DnsCheck, ProvisionError> {
        let check = self.dns.verify(domain).await;
        let record = |s: &mut DomainStatus| {
            s.dns_verified = check.verified;
            s.last_checked = Utc::now();
            s.error_message = (!check.verified).then(|| check.message.clone());
            s.removed = false;
        };
        // Callers hold the lock and have just read `domain` off the
        // workspace, so a missing record is recreated rather than skipped.
        if self.statuses.update(workspace_id, domain, record).await?.is_none() {
            let mut fresh = DomainStatus::new(workspace_id, domain.clone());
            record(&mut fresh);
            self.statuses.put(fresh).await?;
        }
        if !check.verified {
            tracing::info!(workspace_id, domain = %domain, outcome = ?check.outcome, "DNS not verified");
        }
        Ok(check)
    }

    // ── Proxy ───────────────────────────────────────────────────────

    /// The vhost `provision_nginx` would apply right now.
    pub async fn preview_nginx_config(&self, workspace_id: &str) -> Result<String, ProvisionError> {
        let (_, domain) = self.custom_target(workspace_id).await?;
        Ok(render(&self.template, &domain, self.tls_stage(&domain)))
    }

    pub async fn provision_nginx(&self, workspace_id: &str) -> Result<StepResult, ProvisionError> {
        let (_lock, domain) = self.locked_custom_target(workspace_id).await?;
        self.nginx_step(workspace_id, &domain).await
    }

    async fn nginx_step(
        &self,
        workspace_id: &str,
        domain: &DomainName,
    ) -> Result<StepResult, ProvisionError> {
        let dns_verified = self
            .statuses
            .get(workspace_id)
            .await
            .is_some_and(|s| s.dns_verified);
        if !dns_verified {
            return Err(ProvisionError::PreconditionFailed(format!(
                "DNS for {domain} is not verified; verify DNS before configuring the proxy"
            )));
        }

        let stage = self.tls_stage(domain);
        let config = render(&self.template, domain, stage);
        match self.proxy.apply(domain, &config).await {
            Ok(report) => {
                self.statuses
                    .update(workspace_id, domain, |s| {
                        s.nginx_configured = true;
                        s.error_message = None;
                        s.removed = false;
                    })
                    .await?;
                tracing::info!(workspace_id, domain = %domain, stage = ?stage, "Proxy configured");
                Ok(StepResult::ok(
                    ProvisionStep::Nginx,
                    format!("Proxy configured for {domain} ({})", report.path.display()),
                ))
            }
            Err(e) => {
                let message = e.to_string();
                self.statuses
                    .update(workspace_id, domain, |s| {
                        s.error_message = Some(message.clone());
                    })
                    .await?;
                tracing::warn!(workspace_id, domain = %domain, error = %e, "Proxy configuration failed");
                Ok(StepResult::failed(ProvisionStep::Nginx, message))
            }
        }
    }

    // ── Certificates ────────────────────────────────────────────────

    pub async fn provision_ssl(&self, workspace_id: &str) -> Result<StepResult, ProvisionError> {
        let (_lock, domain) = self.locked_custom_target(workspace_id).await?;
        self.ssl_step(workspace_id, &domain).await
    }

    async fn ssl_step(
        &self,
        workspace_id: &str,
        domain: &DomainName,
    ) -> Result<StepResult, ProvisionError> {
        let nginx_configured = self
            .statuses
            .get(workspace_id)
            .await
            .is_some_and(|s| s.nginx_configured);
        if !nginx_configured {
            return Err(ProvisionError::PreconditionFailed(format!(
                "proxy is not configured for {domain}; configure it before requesting a certificate"
            )));
        }

        let alt_names = self.alt_names(domain).await;
        let issued = match self.issuer.issue(domain, &alt_names).await {
            Ok(issued) => issued,
            Err(e) => return self.ssl_failed(workspace_id, domain, e.to_string()).await,
        };

        // A vhost applied before the certificate existed serves plain HTTP.
        let active = render(&self.template, domain, TlsStage::Active);
        let current = self
            .proxy
            .active_config(domain)
            .map_err(|e| ProvisionError::Store(e.to_string()))?;
        if current.as_deref() != Some(active.as_str()) {
            if let Err(e) = self.proxy.apply(domain, &active).await {
                let message = format!("certificate issued but HTTPS config was not applied: {e}");
                return self.ssl_failed(workspace_id, domain, message).await;
            }
        }

        self.statuses
            .update(workspace_id, domain, |s| {
                s.ssl_active = true;
                s.ssl_expiry = Some(issued.expiry);
                s.error_message = None;
                s.removed = false;
            })
            .await?;
        tracing::info!(workspace_id, domain = %domain, expiry = %issued.expiry, "TLS active");
        Ok(StepResult::ok(
            ProvisionStep::Ssl,
            format!(
                "Certificate active for {domain}, expires {}",
                issued.expiry.format("%Y-%m-%d")
            ),
        ))
    }

    /// `www.{domain}` when enabled and it resolves to the ingress; HTTP-01
    /// would fail for a name that does not reach the platform.
    async fn alt_names(&self, domain: &DomainName) -> Vec<DomainName> {
        if !self.include_www {
            return Vec::new();
        }
        let Ok(www) = DomainName::parse(&domain.www()) else {
            return Vec::new();
        };
        if www == *domain {
            return Vec::new();
        }
        let check = self.dns.verify(&www).await;
        if check.verified {
            vec![www]
        } else {
            tracing::debug!(domain = %domain, outcome = ?check.outcome, "www variant left off the certificate");
            Vec::new()
        }
    }

    async fn ssl_failed(
        &self,
        workspace_id: &str,
        domain: &DomainName,
        message: String,
    ) -> Result<StepResult, ProvisionError> {
        self.statuses
            .update(workspace_id, domain, |s| {
                s.error_message = Some(message.clone());
            })
            .await?;
        tracing::warn!(workspace_id, domain = %domain, error = %message, "Certificate step failed");
        Ok(StepResult::failed(ProvisionStep::Ssl, message))
    }

    // ── Pipeline ────────────────────────────────────────────────────

    /// DNS, then proxy, then certificate. Stops at the first failure
    /// before SSL; a failed SSL step leaves the proxy config in place.
    /// Step failures, unmet gates included, land in the report.
    pub async fn full_provision(&self, workspace_id: &str) -> Result<ProvisionReport, ProvisionError> {
        let (_lock, domain) = self.locked_custom_target(workspace_id).await?;
        tracing::info!(workspace_id, domain = %domain, "Full provisioning started");

        let mut steps = Vec::with_capacity(3);

        let check = self.check_dns(workspace_id, &domain).await?;
        steps.push(if check.verified {
            StepResult::ok(ProvisionStep::Dns, check.message)
        } else {
            StepResult::failed(ProvisionStep::Dns, check.message)
        });
        if !check.verified {
            return Ok(report(steps, format!("Stopped: DNS for {domain} is not verified")));
        }

        let nginx = gated(ProvisionStep::Nginx, self.nginx_step(workspace_id, &domain).await)?;
        let nginx_ok = nginx.success;
        steps.push(nginx);
        if !nginx_ok {
            return Ok(report(steps, format!("Stopped: proxy configuration for {domain} failed")));
        }

        let ssl = gated(ProvisionStep::Ssl, self.ssl_step(workspace_id, &domain).await)?;
        let message = if ssl.success {
            format!("{domain} is fully provisioned")
        } else {
            format!("{domain} is served over HTTP; certificate issuance failed")
        };
        steps.push(ssl);
        Ok(report(steps, message))
    }

    // ── Removal ─────────────────────────────────────────────────────

    pub async fn remove_config(&self, workspace_id: &str) -> Result<StepResult, ProvisionError> {
        let (_lock, domain) = self.locked_custom_target(workspace_id).await?;
        self.remove_step(workspace_id, &domain).await
    }

    /// Certificate lineage first, then the proxy config. Both are attempted
    /// whatever the flags say.
    async fn remove_step(
        &self,
        workspace_id: &str,
        domain: &DomainName,
    ) -> Result<StepResult, ProvisionError> {
        let cert = self.issuer.remove(domain).await;
        let cert_removed = matches!(cert, Ok(true));
        let cert_error = cert.err().map(|e| {
            tracing::warn!(workspace_id, domain = %domain, error = %e, "Certificate removal failed");
            format!("certificate for {domain} could not be deleted: {e}")
        });

        let proxy = self.proxy.remove(domain).await;
        let proxy_removed = proxy.as_ref().is_ok_and(|report| report.removed);
        let proxy_error = proxy.err().map(|e| {
            tracing::warn!(workspace_id, domain = %domain, error = %e, "Proxy removal failed");
            format!("proxy config for {domain} could not be removed: {e}")
        });

        let failure = match (&cert_error, &proxy_error) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e.clone()),
            (Some(cert), Some(proxy)) => Some(format!("{cert}; {proxy}")),
        };

        self.statuses
            .update(workspace_id, domain, |s| {
                if proxy_error.is_none() {
                    s.nginx_configured = false;
                }
                // HTTPS is gone once either the certificate or the vhost is.
                if cert_error.is_none() || proxy_error.is_none() {
                    s.ssl_active = false;
                    s.ssl_expiry = None;
                }
                s.error_message = failure.clone();
                s.removed = failure.is_none();
            })
            .await?;

        if let Some(message) = failure {
            return Ok(StepResult::failed(ProvisionStep::Remove, message));
        }

        let message = match (proxy_removed, cert_removed) {
            (false, false) => format!("Nothing to remove for {domain}"),
            (true, true) => format!("Proxy config and certificate removed for {domain}"),
            (true, false) => format!("Proxy config removed for {domain}"),
            (false, true) => format!("Certificate removed for {domain}"),
        };
        tracing::info!(workspace_id, domain = %domain, "Configuration removed");
        Ok(StepResult::ok(ProvisionStep::Remove, message))
    }

    // ── One-call setup ──────────────────────────────────────────────

    /// Find or create the workspace serving `domain` for `owner_id`, then
    /// provision it.
    pub async fn setup_automated(
        &self,
        domain: &str,
        owner_id: &str,
    ) -> Result<SetupReport, ProvisionError> {
        let domain = DomainName::parse(domain)?;
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(ProvisionError::InvalidRequest("user_id is empty".into()));
        }
        if domain == self.base_domain {
            return Err(ProvisionError::InvalidDomain(format!(
                "{domain} is the platform domain itself"
            )));
        }

        let existing = self.workspaces.find_by_hostname(&domain, &self.base_domain).await;
        let (ws, created) = match existing {
            Some(ws) if ws.owner_id != owner_id => {
                return Err(ProvisionError::DomainTaken {
                    domain: domain.to_string(),
                    workspace_id: ws.id,
                });
            }
            Some(ws) => (ws, false),
            None => {
                let config = match domain.as_str().strip_suffix(&format!(".{}", self.base_domain)) {
                    Some(sub) => DomainConfig::Subdomain {
                        subdomain: sub.to_string(),
                    },
                    None => DomainConfig::CustomDomain {
                        domain: domain.clone(),
                    },
                };
                (self.create_workspace(domain.as_str(), owner_id, config).await?, true)
            }
        };

        let mut steps_completed = Vec::new();
        if created {
            steps_completed.push(ProvisionStep::Workspace.as_str().to_string());
        }

        if ws.domain.custom_domain().is_none() {
            return Ok(SetupReport {
                success: true,
                message: format!("{domain} is a platform subdomain; no provisioning required"),
                steps_completed,
                workspace_id: ws.id,
                created,
            });
        }

        let report = self.full_provision(&ws.id).await?;
        steps_completed.extend(
            report
                .steps
                .iter()
                .filter(|s| s.success)
                .map(|s| s.step.as_str().to_string()),
        );
        Ok(SetupReport {
            success: report.overall_success,
            message: report.message,
            steps_completed,
            workspace_id: ws.id,
            created,
        })
    }

    // ── Status reads ────────────────────────────────────────────────

    pub async fn list_status(&self) -> Vec<DomainStatusView> {
        let mut views = Vec::new();
        for status in self.statuses.list().await {
            let name = self
                .workspaces
                .get(&status.workspace_id)
                .await
                .map(|ws| ws.name)
                .unwrap_or_default();
            views.push(DomainStatusView::from_status(&status, &name));
        }
        views.sort_by(|a, b| a.domain.cmp(&b.domain));
        views
    }

    pub async fn status(&self, workspace_id: &str) -> Result<DomainStatusView, ProvisionError> {
        let (ws, domain) = self.custom_target(workspace_id).await?;
        let status = self.statuses.get(workspace_id).await;
        let state = ProvisioningState::of(status.as_ref());
        let view = match status {
            Some(status) => DomainStatusView::from_status(&status, &ws.name),
            None => DomainStatusView {
                workspace_id: ws.id.clone(),
                workspace_name: ws.name.clone(),
                domain: domain.to_string(),
                dns_verified: false,
                nginx_configured: false,
                ssl_active: false,
                ssl_expiry: None,
                last_checked: None,
                error_message: None,
                state: None,
            },
        };
        Ok(view.with_state(state))
    }
}

/// An unmet precondition inside the pipeline is a failed step.
fn gated(
    step: ProvisionStep,
    result: Result<StepResult, ProvisionError>,
) -> Result<StepResult, ProvisionError> {
    match result {
        Err(ProvisionError::PreconditionFailed(message)) => Ok(StepResult::failed(step, message)),
        other => other,
    }
}

fn report(steps: Vec<StepResult>, message: String) -> ProvisionReport {
    ProvisionReport {
        overall_success: steps.iter().all(|s| s.success),
        message,
        steps,
    }
}
