//! Scripted [`CertificateIssuer`] for tests. Writes placeholder files into
//! the store so [`CertPaths::installed`] sees them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use portico_common::domain::{CertPaths, DomainName};

use crate::{CertError, CertificateIssuer, IssuedCertificate};

pub struct ScriptedIssuer {
    store_root: PathBuf,
    expiry: Mutex<DateTime<Utc>>,
    next_failure: Mutex<Option<CertError>>,
    delay: Mutex<Option<Duration>>,
    issued: AtomicUsize,
    last_alt_names: Mutex<Vec<DomainName>>,
}

impl ScriptedIssuer {
    /// Certificates expire 90 days from creation unless changed.
    pub fn new(store_root: PathBuf) -> Self {
        Self {
            store_root,
            expiry: Mutex::new(Utc::now() + chrono::Duration::days(90)),
            next_failure: Mutex::new(None),
            delay: Mutex::new(None),
            issued: AtomicUsize::new(0),
            last_alt_names: Mutex::new(Vec::new()),
        }
    }

    pub fn set_expiry(&self, expiry: DateTime<Utc>) {
        *self.expiry.lock().unwrap() = expiry;
    }

    /// The next `issue` fails with `error`.
    pub fn fail_next(&self, error: CertError) {
        *self.next_failure.lock().unwrap() = Some(error);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Successful issuances so far.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Alternative names passed to the most recent `issue`.
    pub fn last_alt_names(&self) -> Vec<DomainName> {
        self.last_alt_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertificateIssuer for ScriptedIssuer {
    async fn issue(
        &self,
        domain: &DomainName,
        alt_names: &[DomainName],
    ) -> Result<IssuedCertificate, CertError> {
        *self.last_alt_names.lock().unwrap() = alt_names.to_vec();
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.next_failure.lock().unwrap().take() {
            return Err(err);
        }

        let paths = CertPaths::for_domain(&self.store_root, domain);
        std::fs::create_dir_all(&paths.dir)?;
        std::fs::write(&paths.fullchain, format!("scripted chain for {domain}\n"))?;
        std::fs::write(&paths.private_key, "scripted key\n")?;

        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedCertificate {
            expiry: *self.expiry.lock().unwrap(),
            paths,
        })
    }

    async fn remove(&self, domain: &DomainName) -> Result<bool, CertError> {
        let paths = CertPaths::for_domain(&self.store_root, domain);
        if !paths.dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&paths.dir)?;
        Ok(true)
    }
}
