use std::path::{Path, PathBuf};
use std::sync::Arc;

use portico_common::domain::DomainName;
use portico_common::id::generate_short_id;

use crate::control::{ProxyControl, ReloadGate, ReloadGuard};
use crate::ProxyError;

/// Outcome of a successful [`ProxyApplier::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub path: PathBuf,
    /// An earlier active file was replaced.
    pub replaced: bool,
}

/// Outcome of a successful [`ProxyApplier::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    /// False when there was nothing to remove.
    pub removed: bool,
}

/// Writes vhost files into the proxy's include directory.
///
/// Files are named `<domain>.conf` in `sites_dir`. Work in progress lives in
/// `staging_dir`, and promotion happens through a hidden temp file in
/// `sites_dir` followed by a rename, so the proxy never includes a partial
/// file.
pub struct ProxyApplier {
    sites_dir: PathBuf,
    staging_dir: PathBuf,
    control: Arc<dyn ProxyControl>,
    gate: Arc<ReloadGate>,
}

impl ProxyApplier {
    pub fn new(sites_dir: PathBuf, staging_dir: PathBuf, gate: Arc<ReloadGate>) -> Self {
        Self {
            sites_dir,
            staging_dir,
            control: gate.control(),
            gate,
        }
    }

    pub fn active_path(&self, domain: &DomainName) -> PathBuf {
        self.sites_dir.join(format!("{domain}.conf"))
    }

    pub fn is_configured(&self, domain: &DomainName) -> bool {
        self.active_path(domain).is_file()
    }

    /// Contents of the active vhost, if any.
    pub fn active_config(&self, domain: &DomainName) -> Result<Option<String>, ProxyError> {
        let path = self.active_path(domain);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    /// Stage, validate, promote and reload `config` for `domain`.
    ///
    /// A validation failure leaves the active file untouched. A reload
    /// failure restores the previous file (or removes the new one) and
    /// reloads again before reporting the failure.
    pub async fn apply(&self, domain: &DomainName, config: &str) -> Result<ApplyReport, ProxyError> {
        std::fs::create_dir_all(&self.staging_dir)?;
        let staged = self
            .staging_dir
            .join(format!("{domain}.conf.{}", generate_short_id()));
        std::fs::write(&staged, config)?;

        if let Err(e) = self.control.validate(&staged).await {
            let _ = std::fs::remove_file(&staged);
            tracing::warn!(domain = %domain, error = %e, "Staged config failed validation");
            return Err(e);
        }

        let guard = self.gate.lock().await;
        let active = self.active_path(domain);
        let previous = self.active_config(domain)?;

        let promoted = write_atomic(&self.sites_dir, &active, config);
        let _ = std::fs::remove_file(&staged);
        promoted?;

        match guard.reload().await {
            Ok(()) => {
                tracing::info!(
                    domain = %domain,
                    path = %active.display(),
                    replaced = previous.is_some(),
                    "Virtual host activated"
                );
                Ok(ApplyReport {
                    path: active,
                    replaced: previous.is_some(),
                })
            }
            Err(reload_err) => {
                tracing::warn!(domain = %domain, error = %reload_err, "Reload failed, rolling back");
                let restored = match previous {
                    Some(text) => write_atomic(&self.sites_dir, &active, &text),
                    None => std::fs::remove_file(&active).map_err(ProxyError::from),
                };
                Err(self.finish_rollback(&guard, domain, reload_err, restored).await)
            }
        }
    }

    /// Delete the active vhost and reload. Absent config is success.
    pub async fn remove(&self, domain: &DomainName) -> Result<RemoveReport, ProxyError> {
        let guard = self.gate.lock().await;
        let active = self.active_path(domain);
        let Some(previous) = self.active_config(domain)? else {
            tracing::debug!(domain = %domain, "No virtual host to remove");
            return Ok(RemoveReport { removed: false });
        };

        std::fs::remove_file(&active)?;

        match guard.reload().await {
            Ok(()) => {
                tracing::info!(domain = %domain, "Virtual host removed");
                Ok(RemoveReport { removed: true })
            }
            Err(reload_err) => {
                tracing::warn!(domain = %domain, error = %reload_err, "Reload failed, restoring vhost");
                let restored = write_atomic(&self.sites_dir, &active, &previous);
                Err(self.finish_rollback(&guard, domain, reload_err, restored).await)
            }
        }
    }

    /// Reload after a restore and pick the error to report.
    async fn finish_rollback(
        &self,
        guard: &ReloadGuard<'_>,
        domain: &DomainName,
        reload_err: ProxyError,
        restored: Result<(), ProxyError>,
    ) -> ProxyError {
        let reason = match reload_err {
            ProxyError::Reload(msg) => msg,
            other => other.to_string(),
        };
        if let Err(e) = restored {
            tracing::error!(domain = %domain, error = %e, "Could not restore previous vhost");
            return ProxyError::RollbackFailed(format!("{reason}; restore: {e}"));
        }
        match guard.reload().await {
            Ok(()) => ProxyError::Reload(reason),
            Err(e) => {
                tracing::error!(domain = %domain, error = %e, "Reload after rollback failed");
                ProxyError::RollbackFailed(format!("{reason}; reload after rollback: {e}"))
            }
        }
    }
}

/// Replace `path` with `contents` via a hidden sibling temp file.
fn write_atomic(dir: &Path, path: &Path, contents: &str) -> Result<(), ProxyError> {
    std::fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{name}.{}.tmp", generate_short_id()));
    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
