//! Scripted [`ProxyControl`] for tests. No nginx required.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::control::ProxyControl;
use crate::ProxyError;

#[derive(Default)]
pub struct ScriptedControl {
    validations: AtomicUsize,
    reloads: AtomicUsize,
    validation_error: Mutex<Option<String>>,
    /// Remaining reloads to fail, and the message they fail with.
    reload_failures: Mutex<(usize, String)>,
    reload_delay: Mutex<Option<Duration>>,
}

impl ScriptedControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every validation fails with `message` until [`Self::pass_validation`].
    pub fn fail_validation(&self, message: &str) {
        *self.validation_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn pass_validation(&self) {
        *self.validation_error.lock().unwrap() = None;
    }

    /// The next `count` reloads fail with `message`.
    pub fn fail_reloads(&self, count: usize, message: &str) {
        *self.reload_failures.lock().unwrap() = (count, message.to_string());
    }

    /// Sleep inside every reload (to hold the gate).
    pub fn delay_reloads(&self, delay: Duration) {
        *self.reload_delay.lock().unwrap() = Some(delay);
    }

    /// Reload attempts, failed ones included.
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn validate_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyControl for ScriptedControl {
    async fn validate(&self, staged: &Path) -> Result<(), ProxyError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if !staged.is_file() {
            return Err(ProxyError::Validation(format!(
                "open() \"{}\" failed (2: No such file or directory)",
                staged.display()
            )));
        }
        match self.validation_error.lock().unwrap().clone() {
            Some(message) => Err(ProxyError::Validation(message)),
            None => Ok(()),
        }
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        let delay = *self.reload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.reload_failures.lock().unwrap();
        if failures.0 > 0 {
            failures.0 -= 1;
            return Err(ProxyError::Reload(failures.1.clone()));
        }
        Ok(())
    }
}
