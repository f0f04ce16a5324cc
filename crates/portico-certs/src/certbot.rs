use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use portico_common::domain::{CertPaths, DomainName};
use portico_proxy::process::{self, CommandError};
use portico_proxy::ReloadGate;

use crate::certfiles;
use crate::{CertError, CertificateIssuer, IssuedCertificate};

/// How certbot is invoked.
#[derive(Debug, Clone)]
pub struct CertbotOptions {
    pub certbot_binary: String,
    /// Directory nginx serves `/.well-known/acme-challenge/` from.
    pub acme_webroot: PathBuf,
    /// certbot `--config-dir`; lineages land in `live/<domain>/`.
    pub store_root: PathBuf,
    pub contact_email: Option<String>,
    /// Use the authority's staging environment.
    pub staging: bool,
    pub timeout: Duration,
}

/// [`CertificateIssuer`] that shells out to certbot in webroot mode.
pub struct CertbotIssuer {
    options: CertbotOptions,
    gate: Arc<ReloadGate>,
}

impl CertbotIssuer {
    pub fn new(options: CertbotOptions, gate: Arc<ReloadGate>) -> Self {
        Self { options, gate }
    }

    fn common_args(&self) -> Vec<String> {
        let store = &self.options.store_root;
        vec![
            "--config-dir".to_string(),
            store.display().to_string(),
            "--work-dir".to_string(),
            store.join("work").display().to_string(),
            "--logs-dir".to_string(),
            store.join("logs").display().to_string(),
            "--non-interactive".to_string(),
        ]
    }

    fn issue_argv(&self, domain: &DomainName, alt_names: &[DomainName]) -> Vec<String> {
        let opts = &self.options;
        let mut argv = vec![
            opts.certbot_binary.clone(),
            "certonly".to_string(),
            "--webroot".to_string(),
            "-w".to_string(),
            opts.acme_webroot.display().to_string(),
            "--cert-name".to_string(),
            domain.to_string(),
            "-d".to_string(),
            domain.to_string(),
        ];
        for name in alt_names.iter().filter(|n| *n != domain) {
            argv.push("-d".to_string());
            argv.push(name.to_string());
        }
        argv.extend(self.common_args());
        argv.push("--agree-tos".to_string());
        argv.push("--keep-until-expiring".to_string());
        argv.push("--expand".to_string());
        match &opts.contact_email {
            Some(email) => {
                argv.push("-m".to_string());
                argv.push(email.clone());
            }
            None => argv.push("--register-unsafely-without-email".to_string()),
        }
        if opts.staging {
            argv.push("--staging".to_string());
        }
        argv
    }

    fn delete_argv(&self, domain: &DomainName) -> Vec<String> {
        let mut argv = vec![
            self.options.certbot_binary.clone(),
            "delete".to_string(),
            "--cert-name".to_string(),
            domain.to_string(),
        ];
        argv.extend(self.common_args());
        argv
    }

    fn lineage_exists(&self, domain: &DomainName) -> bool {
        let renewal = self
            .options
            .store_root
            .join("renewal")
            .join(format!("{domain}.conf"));
        CertPaths::for_domain(&self.options.store_root, domain).dir.exists() || renewal.exists()
    }
}

/// Sort certbot's failure output into the error kinds callers act on.
fn classify(output: String) -> CertError {
    let lower = output.to_ascii_lowercase();
    if lower.contains("ratelimited") || lower.contains("too many certificates") {
        CertError::RateLimited(output)
    } else if lower.contains("challenge failed")
        || lower.contains("unauthorized")
        || lower.contains("invalid response")
        || lower.contains("dns problem")
        || lower.contains("connection refused")
    {
        CertError::ChallengeFailed(output)
    } else {
        CertError::Failed(output)
    }
}

fn command_failure(e: CommandError) -> CertError {
    match e {
        CommandError::TimedOut { secs, .. } => CertError::TimedOut { secs },
        other => CertError::Failed(other.to_string()),
    }
}

#[async_trait]
impl CertificateIssuer for CertbotIssuer {
    async fn issue(
        &self,
        domain: &DomainName,
        alt_names: &[DomainName],
    ) -> Result<IssuedCertificate, CertError> {
        tracing::info!(
            domain = %domain,
            alt_names = alt_names.len(),
            staging = self.options.staging,
            "Requesting certificate"
        );

        let out = process::run(&self.issue_argv(domain, alt_names), self.options.timeout)
            .await
            .map_err(command_failure)?;
        if !out.success {
            let err = classify(out.output);
            tracing::warn!(domain = %domain, error = %err, "Certificate request failed");
            return Err(err);
        }

        let paths = CertPaths::for_domain(&self.options.store_root, domain);
        if !paths.installed() {
            return Err(CertError::Failed(format!(
                "certbot reported success but {} is missing",
                paths.fullchain.display()
            )));
        }
        certfiles::restrict_key(&paths.private_key)?;
        let expiry = certfiles::read_expiry(&paths.fullchain)?;

        self.gate.reload().await.map_err(|e| {
            CertError::Failed(format!("certificate installed but proxy reload failed: {e}"))
        })?;

        tracing::info!(domain = %domain, expiry = %expiry, "Certificate installed");
        Ok(IssuedCertificate { expiry, paths })
    }

    async fn remove(&self, domain: &DomainName) -> Result<bool, CertError> {
        if !self.lineage_exists(domain) {
            tracing::debug!(domain = %domain, "No certificate lineage to delete");
            return Ok(false);
        }

        let out = process::run(&self.delete_argv(domain), self.options.timeout)
            .await
            .map_err(command_failure)?;
        if !out.success {
            return Err(CertError::Failed(out.output));
        }
        tracing::info!(domain = %domain, "Certificate lineage deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_common::persist::scratch_dir;
    use portico_proxy::testing::ScriptedControl;

    fn issuer(binary: &str, store_root: PathBuf, control: Arc<ScriptedControl>) -> CertbotIssuer {
        CertbotIssuer::new(
            CertbotOptions {
                certbot_binary: binary.to_string(),
                acme_webroot: PathBuf::from("/var/www/acme"),
                store_root,
                contact_email: Some("ops@example-platform.com".to_string()),
                staging: false,
                timeout: Duration::from_secs(5),
            },
            Arc::new(ReloadGate::new(control)),
        )
    }

    fn domain() -> DomainName {
        DomainName::parse("shop.example.com").unwrap()
    }

    fn www() -> DomainName {
        DomainName::parse("www.shop.example.com").unwrap()
    }

    #[test]
    fn issue_argv_covers_apex_and_alt_names() {
        let issuer = issuer("certbot", PathBuf::from("/etc/portico/certs"), Arc::new(ScriptedControl::new()));
        let argv = issuer.issue_argv(&domain(), &[www()]).join(" ");

        assert!(argv.starts_with("certbot certonly --webroot -w /var/www/acme"));
        assert!(argv.contains("--cert-name shop.example.com"));
        assert!(argv.contains("-d shop.example.com -d www.shop.example.com"));
        assert!(argv.contains("--config-dir /etc/portico/certs"));
        assert!(argv.contains("--non-interactive"));
        assert!(argv.contains("-m ops@example-platform.com"));
        assert!(!argv.contains("--staging"));
    }

    #[test]
    fn issue_argv_without_email_registers_anonymously() {
        let mut issuer = issuer("certbot", PathBuf::from("/c"), Arc::new(ScriptedControl::new()));
        issuer.options.contact_email = None;
        issuer.options.staging = true;
        let argv = issuer.issue_argv(&domain(), &[]).join(" ");

        assert!(argv.contains("--register-unsafely-without-email"));
        assert!(argv.contains("--staging"));
    }

    #[test]
    fn issue_argv_names_only_the_apex_without_alt_names() {
        let issuer = issuer("certbot", PathBuf::from("/c"), Arc::new(ScriptedControl::new()));
        let argv = issuer.issue_argv(&domain(), &[]);

        assert_eq!(argv.iter().filter(|a| *a == "-d").count(), 1);
        assert!(!argv.join(" ").contains("www."));
        // The apex repeated as an alt name is not requested twice.
        let argv = issuer.issue_argv(&domain(), &[domain()]);
        assert_eq!(argv.iter().filter(|a| *a == "-d").count(), 1);
    }

    #[test]
    fn classify_failures() {
        assert!(matches!(
            classify("Error creating new order :: too many certificates already issued".into()),
            CertError::RateLimited(_)
        ));
        assert!(matches!(
            classify("Challenge failed for domain shop.example.com".into()),
            CertError::ChallengeFailed(_)
        ));
        assert!(matches!(
            classify("Detail: DNS problem: NXDOMAIN looking up A".into()),
            CertError::ChallengeFailed(_)
        ));
        assert!(matches!(classify("something else".into()), CertError::Failed(_)));
    }

    #[test]
    fn authority_message_is_kept_verbatim() {
        let msg = "urn:ietf:params:acme:error:rateLimited :: too many certificates (5) already issued";
        match classify(msg.to_string()) {
            CertError::RateLimited(m) => assert_eq!(m, msg),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_certbot_does_not_reload() {
        let control = Arc::new(ScriptedControl::new());
        let issuer = issuer("false", scratch_dir("certbot-fail"), control.clone());

        assert!(matches!(issuer.issue(&domain(), &[]).await, Err(CertError::Failed(_))));
        assert_eq!(control.reload_count(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_a_failure() {
        let issuer = issuer(
            "portico-no-such-certbot",
            scratch_dir("certbot-missing"),
            Arc::new(ScriptedControl::new()),
        );
        assert!(matches!(issuer.issue(&domain(), &[]).await, Err(CertError::Failed(_))));
    }

    #[tokio::test]
    async fn remove_without_lineage_is_noop() {
        let issuer = issuer(
            "portico-no-such-certbot",
            scratch_dir("certbot-remove"),
            Arc::new(ScriptedControl::new()),
        );
        assert!(!issuer.remove(&domain()).await.unwrap());
    }
}
