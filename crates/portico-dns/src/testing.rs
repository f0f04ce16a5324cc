//! In-memory [`AddressLookup`] for tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use portico_common::domain::DomainName;

use crate::{AddressLookup, LookupFailure};

/// Answers from a table; unknown names report no records.
#[derive(Default)]
pub struct ScriptedLookup {
    answers: Mutex<HashMap<String, Result<Vec<IpAddr>, LookupFailure>>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, domain: &DomainName, answer: Result<Vec<IpAddr>, LookupFailure>) {
        self.answers
            .lock()
            .unwrap()
            .insert(domain.as_str().to_string(), answer);
    }

    /// Point `domain` at a single address.
    pub fn point(&self, domain: &DomainName, ip: &str) {
        self.set(domain, Ok(vec![ip.parse().unwrap()]));
    }

    /// Sleep before answering (to exercise timeouts).
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl AddressLookup for ScriptedLookup {
    async fn lookup(&self, domain: &DomainName) -> Result<Vec<IpAddr>, LookupFailure> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .get(domain.as_str())
            .cloned()
            .unwrap_or(Err(LookupFailure::NoRecords))
    }
}
