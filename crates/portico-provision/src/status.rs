//! Durable per-workspace domain status.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use portico_common::domain::DomainName;
use portico_common::persist::{read_json_or_default, write_json_pretty};

/// Provisioning progress for one workspace's custom domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DomainStatus {
    pub workspace_id: String,
    #[schema(value_type = String)]
    pub domain: DomainName,
    pub dns_verified: bool,
    pub nginx_configured: bool,
    /// Only ever true while `nginx_configured` is.
    pub ssl_active: bool,
    pub ssl_expiry: Option<DateTime<Utc>>,
    pub last_checked: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Set by a removal that left neither proxy config nor certificate;
    /// cleared by the next step that runs.
    #[serde(default)]
    pub removed: bool,
}

impl DomainStatus {
    pub fn new(workspace_id: &str, domain: DomainName) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            domain,
            dns_verified: false,
            nginx_configured: false,
            ssl_active: false,
            ssl_expiry: None,
            last_checked: Utc::now(),
            error_message: None,
            removed: false,
        }
    }
}

/// JSON-file backed map of [`DomainStatus`] by workspace id.
///
/// Every mutation rewrites the file atomically before the in-memory copy
/// changes, so a failed write leaves both untouched.
pub struct StatusStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, DomainStatus>>,
}

impl StatusStore {
    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let records: BTreeMap<String, DomainStatus> = read_json_or_default(path)?;
        tracing::debug!(path = %path.display(), count = records.len(), "Status store loaded");
        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    pub async fn get(&self, workspace_id: &str) -> Option<DomainStatus> {
        self.records.read().await.get(workspace_id).cloned()
    }

    pub async fn list(&self) -> Vec<DomainStatus> {
        self.records.read().await.values().cloned().collect()
    }

    /// Non-blocking snapshot for synchronous callers.
    pub fn try_list(&self) -> Option<Vec<DomainStatus>> {
        self.records
            .try_read()
            .ok()
            .map(|r| r.values().cloned().collect())
    }

    /// Store `status` as the record for its workspace.
    pub async fn put(&self, status: DomainStatus) -> Result<(), io::Error> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.insert(status.workspace_id.clone(), status);
        write_json_pretty(&self.path, &next)?;
        *records = next;
        Ok(())
    }

    /// Apply `f` to the workspace's record and persist.
    ///
    /// Only an existing record for `domain` is touched. `Ok(None)` when the
    /// workspace has no record or its record belongs to another domain;
    /// records are created with [`StatusStore::put`] alone.
    pub async fn update<F>(
        &self,
        workspace_id: &str,
        domain: &DomainName,
        f: F,
    ) -> Result<Option<DomainStatus>, io::Error>
    where
        F: FnOnce(&mut DomainStatus),
    {
        let mut records = self.records.write().await;
        if !records
            .get(workspace_id)
            .is_some_and(|s| s.domain == *domain)
        {
            tracing::debug!(workspace_id, domain = %domain, "No status record for domain, update skipped");
            return Ok(None);
        }
        let mut next = records.clone();
        let Some(entry) = next.get_mut(workspace_id) else {
            return Ok(None);
        };
        f(entry);
        let updated = entry.clone();
        write_json_pretty(&self.path, &next)?;
        *records = next;
        Ok(Some(updated))
    }

    /// Drop the workspace's record. Returns whether one existed.
    pub async fn remove(&self, workspace_id: &str) -> Result<bool, io::Error> {
        let mut records = self.records.write().await;
        if !records.contains_key(workspace_id) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(workspace_id);
        write_json_pretty(&self.path, &next)?;
        *records = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_common::persist::scratch_dir;

    fn domain() -> DomainName {
        DomainName::parse("shop.example.com").unwrap()
    }

    #[tokio::test]
    async fn update_modifies_and_persists() {
        let path = scratch_dir("status").join("domains.json");
        let store = StatusStore::load(&path).unwrap();
        store.put(DomainStatus::new("ws-1", domain())).await.unwrap();

        let updated = store
            .update("ws-1", &domain(), |s| s.dns_verified = true)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.dns_verified);
        assert!(!updated.nginx_configured);

        let reloaded = StatusStore::load(&path).unwrap();
        let record = reloaded.get("ws-1").await.unwrap();
        assert!(record.dns_verified);
        assert_eq!(record.domain, domain());
    }

    #[tokio::test]
    async fn update_never_creates_a_record() {
        let path = scratch_dir("status-absent").join("domains.json");
        let store = StatusStore::load(&path).unwrap();

        let updated = store
            .update("ws-1", &domain(), |s| s.dns_verified = true)
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(store.get("ws-1").await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn update_for_another_domain_is_skipped() {
        let path = scratch_dir("status-other").join("domains.json");
        let store = StatusStore::load(&path).unwrap();
        let current = DomainName::parse("new.example.org").unwrap();
        store.put(DomainStatus::new("ws-1", current.clone())).await.unwrap();

        let updated = store
            .update("ws-1", &domain(), |s| s.dns_verified = true)
            .await
            .unwrap();
        assert!(updated.is_none());
        let record = store.get("ws-1").await.unwrap();
        assert_eq!(record.domain, current);
        assert!(!record.dns_verified);
    }

    #[test]
    fn records_without_removed_flag_still_load() {
        let json = r#"{
            "workspace_id": "ws-1",
            "domain": "shop.example.com",
            "dns_verified": true,
            "nginx_configured": false,
            "ssl_active": false,
            "ssl_expiry": null,
            "last_checked": "2026-01-01T00:00:00Z",
            "error_message": null
        }"#;
        let status: DomainStatus = serde_json::from_str(json).unwrap();
        assert!(status.dns_verified);
        assert!(!status.removed);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let path = scratch_dir("status-remove").join("domains.json");
        let store = StatusStore::load(&path).unwrap();
        store.put(DomainStatus::new("ws-1", domain())).await.unwrap();

        assert!(store.remove("ws-1").await.unwrap());
        assert!(!store.remove("ws-1").await.unwrap());
        assert!(StatusStore::load(&path).unwrap().get("ws-1").await.is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = scratch_dir("status-fail");
        // A directory where the file should be makes the rename fail.
        let path = dir.join("domains.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();
        let store = StatusStore {
            path: path.clone(),
            records: RwLock::new(BTreeMap::new()),
        };

        assert!(store.put(DomainStatus::new("ws-1", domain())).await.is_err());
        assert!(store.get("ws-1").await.is_none());
    }

    #[test]
    fn status_serializes_wire_fields() {
        let json = serde_json::to_value(DomainStatus::new("ws-1", domain())).unwrap();
        for key in [
            "workspace_id",
            "domain",
            "dns_verified",
            "nginx_configured",
            "ssl_active",
            "ssl_expiry",
            "last_checked",
            "error_message",
            "removed",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["domain"], "shop.example.com");
    }
}
