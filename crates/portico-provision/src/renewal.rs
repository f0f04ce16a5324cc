//! Background certificate renewal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use portico_certs::renewal_due;

use crate::{ProvisionError, ProvisioningController};

/// Outcome of one renewal pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalSummary {
    pub due: usize,
    pub renewed: usize,
    pub failed: usize,
    /// Busy workspaces, retried next pass.
    pub skipped: usize,
}

/// Re-issue every active certificate expiring within `threshold_days`.
pub async fn renew_due(
    controller: &ProvisioningController,
    threshold_days: i64,
    now: DateTime<Utc>,
) -> RenewalSummary {
    let mut summary = RenewalSummary::default();

    for status in controller.status_store().list().await {
        let Some(expiry) = status.ssl_expiry else {
            continue;
        };
        if !status.ssl_active || !renewal_due(expiry, now, threshold_days) {
            continue;
        }
        summary.due += 1;

        match controller.provision_ssl(&status.workspace_id).await {
            Ok(step) if step.success => summary.renewed += 1,
            Ok(step) => {
                summary.failed += 1;
                tracing::warn!(
                    workspace_id = %status.workspace_id,
                    domain = %status.domain,
                    error = %step.message,
                    "Certificate renewal failed"
                );
            }
            Err(ProvisionError::InProgress(_)) => summary.skipped += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    workspace_id = %status.workspace_id,
                    domain = %status.domain,
                    error = %e,
                    "Certificate renewal failed"
                );
            }
        }
    }

    if summary.due > 0 {
        tracing::info!(
            due = summary.due,
            renewed = summary.renewed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Renewal pass complete"
        );
    }
    summary
}

async fn run_renewal_loop(
    controller: Arc<ProvisioningController>,
    interval: Duration,
    threshold_days: i64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                renew_due(&controller, threshold_days, Utc::now()).await;
            }
        }
    }
}

/// Starts and stops the periodic renewal pass.
pub struct RenewalRuntime {
    controller: Arc<ProvisioningController>,
    interval: Duration,
    threshold_days: i64,
    state: Arc<tokio::sync::Mutex<RuntimeState>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RenewalRuntimeStatus {
    pub running: bool,
}

struct RuntimeState {
    running: bool,
    cancel: Option<CancellationToken>,
}

impl RenewalRuntime {
    pub fn new(controller: Arc<ProvisioningController>, interval: Duration, threshold_days: i64) -> Self {
        Self {
            controller,
            interval,
            threshold_days,
            state: Arc::new(tokio::sync::Mutex::new(RuntimeState {
                running: false,
                cancel: None,
            })),
        }
    }

    /// Returns `false` when already running.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.running {
            return false;
        }
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.running = true;
        drop(state);

        let controller = Arc::clone(&self.controller);
        let state = Arc::clone(&self.state);
        let interval = self.interval;
        let threshold_days = self.threshold_days;
        tokio::spawn(async move {
            run_renewal_loop(controller, interval, threshold_days, token).await;
            let mut guard = state.lock().await;
            // A restart may already have installed a fresh token.
            if guard.cancel.as_ref().map_or(true, |t| t.is_cancelled()) {
                guard.running = false;
                guard.cancel = None;
            }
        });
        tracing::info!(interval_secs = self.interval.as_secs(), "Renewal runtime started");
        true
    }

    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if let Some(token) = state.cancel.take() {
            token.cancel();
            state.running = false;
            true
        } else {
            false
        }
    }

    pub async fn status(&self) -> RenewalRuntimeStatus {
        let state = self.state.lock().await;
        RenewalRuntimeStatus {
            running: state.running,
        }
    }
}
