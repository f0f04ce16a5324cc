//! Workspace records: the minimum the controller needs to know about a
//! tenant.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use portico_common::domain::{DomainError, DomainName};
use portico_common::id::generate_workspace_id;
use portico_common::persist::{read_json_or_default, write_json_pretty};

/// How a workspace is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainConfig {
    /// `{subdomain}.{base_domain}`, served by the platform's own config.
    Subdomain { subdomain: String },
    /// A tenant-owned name that must point at the platform.
    CustomDomain {
        #[schema(value_type = String)]
        domain: DomainName,
    },
}

impl DomainConfig {
    pub fn custom_domain(&self) -> Option<&DomainName> {
        match self {
            DomainConfig::CustomDomain { domain } => Some(domain),
            DomainConfig::Subdomain { .. } => None,
        }
    }

    /// Full hostname under `base`.
    pub fn hostname(&self, base: &DomainName) -> Result<DomainName, DomainError> {
        match self {
            DomainConfig::Subdomain { subdomain } => {
                if subdomain.contains('.') {
                    return Err(DomainError::InvalidLabel {
                        domain: format!("{subdomain}.{base}"),
                        label: subdomain.clone(),
                    });
                }
                DomainName::parse(&format!("{subdomain}.{base}"))
            }
            DomainConfig::CustomDomain { domain } => Ok(domain.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    /// URL-safe and fixed at creation.
    pub slug: String,
    pub owner_id: String,
    pub domain: DomainConfig,
    pub created_at: DateTime<Utc>,
}

/// Lowercase ASCII letters, digits and single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "workspace".to_string()
    } else {
        slug.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{hostname} is already attached to workspace {workspace_id}")]
    HostnameTaken {
        hostname: String,
        workspace_id: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fails when a record other than `except` already resolves to the
/// hostname of `config`.
fn ensure_hostname_free(
    records: &BTreeMap<String, Workspace>,
    config: &DomainConfig,
    base: &DomainName,
    except: Option<&str>,
) -> Result<(), RegistryError> {
    let Ok(hostname) = config.hostname(base) else {
        return Ok(());
    };
    match records
        .values()
        .filter(|ws| Some(ws.id.as_str()) != except)
        .find(|ws| ws.domain.hostname(base).as_ref() == Ok(&hostname))
    {
        Some(owner) => Err(RegistryError::HostnameTaken {
            hostname: hostname.to_string(),
            workspace_id: owner.id.clone(),
        }),
        None => Ok(()),
    }
}

/// JSON-file backed workspace records.
///
/// Hostnames are unique: `create` and `set_domain` check for a conflict
/// under the same write lock that commits the record.
pub struct WorkspaceRegistry {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Workspace>>,
}

impl WorkspaceRegistry {
    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let records: BTreeMap<String, Workspace> = read_json_or_default(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    pub async fn get(&self, id: &str) -> Option<Workspace> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Workspace> {
        self.records.read().await.values().cloned().collect()
    }

    pub fn try_count(&self) -> Option<usize> {
        self.records.try_read().ok().map(|r| r.len())
    }

    /// The workspace whose config resolves to `hostname`, if any.
    pub async fn find_by_hostname(
        &self,
        hostname: &DomainName,
        base: &DomainName,
    ) -> Option<Workspace> {
        self.records
            .read()
            .await
            .values()
            .find(|ws| ws.domain.hostname(base).as_ref() == Ok(hostname))
            .cloned()
    }

    /// Create a workspace with a fresh id and a slug unique in the registry.
    pub async fn create(
        &self,
        name: &str,
        owner_id: &str,
        domain: DomainConfig,
        base_domain: &DomainName,
    ) -> Result<Workspace, RegistryError> {
        let mut records = self.records.write().await;
        ensure_hostname_free(&records, &domain, base_domain, None)?;

        let base = slugify(name);
        let mut slug = base.clone();
        let mut n = 2;
        while records.values().any(|ws| ws.slug == slug) {
            slug = format!("{base}-{n}");
            n += 1;
        }

        let workspace = Workspace {
            id: generate_workspace_id(),
            name: name.to_string(),
            slug,
            owner_id: owner_id.to_string(),
            domain,
            created_at: Utc::now(),
        };

        let mut next = records.clone();
        next.insert(workspace.id.clone(), workspace.clone());
        write_json_pretty(&self.path, &next)?;
        *records = next;
        tracing::info!(workspace_id = %workspace.id, slug = %workspace.slug, "Workspace created");
        Ok(workspace)
    }

    /// Replace the domain config. `Ok(None)` when the workspace is unknown.
    pub async fn set_domain(
        &self,
        id: &str,
        domain: DomainConfig,
        base_domain: &DomainName,
    ) -> Result<Option<Workspace>, RegistryError> {
        let mut records = self.records.write().await;
        if !records.contains_key(id) {
            return Ok(None);
        }
        ensure_hostname_free(&records, &domain, base_domain, Some(id))?;
        let mut next = records.clone();
        let Some(ws) = next.get_mut(id) else {
            return Ok(None);
        };
        ws.domain = domain;
        let updated = ws.clone();
        write_json_pretty(&self.path, &next)?;
        *records = next;
        Ok(Some(updated))
    }

    pub async fn remove(&self, id: &str) -> Result<bool, io::Error> {
        let mut records = self.records.write().await;
        if !records.contains_key(id) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(id);
        write_json_pretty(&self.path, &next)?;
        *records = next;
        Ok(true)
    }
}
