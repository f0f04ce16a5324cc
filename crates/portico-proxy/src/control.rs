use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::process;
use crate::ProxyError;

/// Validation and reload of the shared proxy process.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Dry-run the proxy's own validation against a staged vhost file.
    async fn validate(&self, staged: &Path) -> Result<(), ProxyError>;

    /// Graceful reload: workers finish in-flight requests.
    async fn reload(&self) -> Result<(), ProxyError>;
}

/// [`ProxyControl`] backed by the nginx binary.
pub struct NginxControl {
    nginx_binary: String,
    reload_command: Vec<String>,
    timeout: Duration,
}

impl NginxControl {
    pub fn new(nginx_binary: String, reload_command: Vec<String>, timeout: Duration) -> Self {
        Self {
            nginx_binary,
            reload_command,
            timeout,
        }
    }
}

/// Minimal main config that includes only the staged vhost, so `nginx -t`
/// checks the new file without touching the live configuration.
fn check_wrapper(staged: &Path, pid_path: &Path) -> String {
    format!(
        "pid {};\nerror_log stderr;\nevents {{}}\nhttp {{\n    access_log off;\n    include {};\n}}\n",
        pid_path.display(),
        staged.display()
    )
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn validate(&self, staged: &Path) -> Result<(), ProxyError> {
        let wrapper = PathBuf::from(format!("{}.check", staged.display()));
        let pid = PathBuf::from(format!("{}.pid", staged.display()));
        std::fs::write(&wrapper, check_wrapper(staged, &pid))?;

        let argv = vec![
            self.nginx_binary.clone(),
            "-t".to_string(),
            "-q".to_string(),
            "-c".to_string(),
            wrapper.display().to_string(),
        ];
        let result = process::run(&argv, self.timeout).await;
        let _ = std::fs::remove_file(&wrapper);

        match result {
            Ok(out) if out.success => Ok(()),
            Ok(out) => Err(ProxyError::Validation(out.output)),
            Err(e) => Err(ProxyError::Validation(e.to_string())),
        }
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        match process::run(&self.reload_command, self.timeout).await {
            Ok(out) if out.success => {
                tracing::debug!("Proxy reloaded");
                Ok(())
            }
            Ok(out) => Err(ProxyError::Reload(out.output)),
            Err(e) => Err(ProxyError::Reload(e.to_string())),
        }
    }
}

/// Host-wide serialization point for promote+reload sequences.
///
/// Rendering and validation run in parallel across workspaces; anything
/// that changes what the proxy loads and then reloads it holds the gate.
pub struct ReloadGate {
    control: Arc<dyn ProxyControl>,
    lock: Mutex<()>,
}

impl ReloadGate {
    pub fn new(control: Arc<dyn ProxyControl>) -> Self {
        Self {
            control,
            lock: Mutex::new(()),
        }
    }

    pub fn control(&self) -> Arc<dyn ProxyControl> {
        Arc::clone(&self.control)
    }

    /// Wait for exclusive use of the proxy.
    pub async fn lock(&self) -> ReloadGuard<'_> {
        ReloadGuard {
            _guard: self.lock.lock().await,
            control: self.control.as_ref(),
        }
    }

    /// Reload once, holding the gate only for the reload itself.
    pub async fn reload(&self) -> Result<(), ProxyError> {
        self.lock().await.reload().await
    }
}

/// Exclusive access to the proxy for the guard's lifetime.
pub struct ReloadGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    control: &'a dyn ProxyControl,
}

impl ReloadGuard<'_> {
    pub async fn reload(&self) -> Result<(), ProxyError> {
        self.control.reload().await
    }
}
