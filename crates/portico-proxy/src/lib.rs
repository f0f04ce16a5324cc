//! Portico Proxy: renders nginx virtual hosts and activates them safely.
//!
//! Rendering is pure ([`render`]). Activation ([`ProxyApplier`]) stages,
//! validates, promotes and reloads, restoring the last-known-good file when
//! the reload fails. Every promote+reload on the host goes through one
//! [`ReloadGate`], shared with the certificate issuer.

mod applier;
mod control;
pub mod process;
mod render;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use applier::{ApplyReport, ProxyApplier, RemoveReport};
pub use control::{NginxControl, ProxyControl, ReloadGate, ReloadGuard};
pub use render::{render, TlsStage, VhostTemplate};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("proxy io error: {0}")]
    Io(String),

    #[error("configuration rejected by validator: {0}")]
    Validation(String),

    #[error("proxy reload failed: {0}")]
    Reload(String),

    #[error("proxy reload failed and rollback did not complete: {0}")]
    RollbackFailed(String),
}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
