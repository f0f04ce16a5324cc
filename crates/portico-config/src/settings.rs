//! Settings file (`config.toml`) model.
//!
//! Every section has serde defaults, so an empty file is a valid starting
//! point. Paths left unset resolve under the data directory.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use portico_common::domain::DomainName;
use portico_common::paths;

/// Default DNS lookup timeout (seconds).
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 5;
/// Default timeout for nginx validate/reload commands (seconds).
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
/// Default timeout for one certificate issuance (seconds).
pub const DEFAULT_ISSUE_TIMEOUT_SECS: u64 = 180;
/// Certificates are renewed when fewer than this many days remain.
pub const DEFAULT_RENEWAL_THRESHOLD_DAYS: i64 = 30;
/// How often the renewal loop looks for expiring certificates (seconds).
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 12 * 3600;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub proxy: ProxySettings,
    pub certs: CertSettings,
    pub dns: DnsSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformSettings {
    /// Published ingress addresses. A custom domain is verified when it
    /// resolves to any of them.
    pub ingress_ips: Vec<IpAddr>,
    /// Base domain under which workspaces get `{slug}.{base_domain}`.
    pub base_domain: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            ingress_ips: Vec::new(),
            base_domain: "example-platform.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySettings {
    /// Directory nginx includes virtual hosts from.
    pub sites_dir: Option<PathBuf>,
    /// Where rendered configs are staged and validated before promotion.
    pub staging_dir: Option<PathBuf>,
    pub nginx_binary: String,
    /// Graceful reload command. Must not hard-restart the proxy.
    pub reload_command: Vec<String>,
    /// Backend the API location proxies to, as `host:port`.
    pub backend_upstream: String,
    pub api_prefix: String,
    /// Static frontend bundle root.
    pub frontend_root: PathBuf,
    /// Directory served under `/.well-known/acme-challenge/`.
    pub acme_webroot: PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            sites_dir: None,
            staging_dir: None,
            nginx_binary: "nginx".to_string(),
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            backend_upstream: "127.0.0.1:8000".to_string(),
            api_prefix: "/api/".to_string(),
            frontend_root: PathBuf::from("/var/www/portico/dist"),
            acme_webroot: PathBuf::from("/var/www/acme"),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl ProxySettings {
    pub fn sites_dir(&self) -> PathBuf {
        self.sites_dir
            .clone()
            .unwrap_or_else(|| paths::portico_data_dir().join("proxy").join("sites"))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| paths::portico_data_dir().join("proxy").join("staging"))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertSettings {
    /// certbot `--config-dir`; certificates land in `live/<domain>/`.
    pub store_root: Option<PathBuf>,
    pub certbot_binary: String,
    pub contact_email: Option<String>,
    /// Also request the `www.` variant, on each issuance where it resolves
    /// to an ingress address. The apex alone is requested otherwise.
    pub include_www: bool,
    /// Use the authority's staging environment.
    pub staging: bool,
    pub issue_timeout_secs: u64,
    pub renewal_threshold_days: i64,
    pub renewal_interval_secs: u64,
}

impl Default for CertSettings {
    fn default() -> Self {
        Self {
            store_root: None,
            certbot_binary: "certbot".to_string(),
            contact_email: None,
            include_www: true,
            staging: false,
            issue_timeout_secs: DEFAULT_ISSUE_TIMEOUT_SECS,
            renewal_threshold_days: DEFAULT_RENEWAL_THRESHOLD_DAYS,
            renewal_interval_secs: DEFAULT_RENEWAL_INTERVAL_SECS,
        }
    }
}

impl CertSettings {
    pub fn store_root(&self) -> PathBuf {
        self.store_root
            .clone()
            .unwrap_or_else(|| paths::portico_data_dir().join("certs"))
    }

    pub fn issue_timeout(&self) -> Duration {
        Duration::from_secs(self.issue_timeout_secs)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsSettings {
    pub timeout_secs: u64,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DNS_TIMEOUT_SECS,
        }
    }
}

impl DnsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub status_path: Option<PathBuf>,
    pub workspaces_path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn status_path(&self) -> PathBuf {
        self.status_path
            .clone()
            .unwrap_or_else(|| paths::portico_state_dir().join("domains.json"))
    }

    pub fn workspaces_path(&self) -> PathBuf {
        self.workspaces_path
            .clone()
            .unwrap_or_else(|| paths::portico_state_dir().join("workspaces.json"))
    }
}

/// Default settings file location.
pub fn default_config_path() -> PathBuf {
    paths::portico_data_dir().join("config.toml")
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    /// The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let settings = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(SettingsError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn base_domain(&self) -> Result<DomainName, SettingsError> {
        DomainName::parse(&self.platform.base_domain).map_err(|e| SettingsError::Invalid {
            key: "platform.base_domain",
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.platform.ingress_ips.is_empty() {
            return Err(SettingsError::Invalid {
                key: "platform.ingress_ips",
                message: "at least one ingress address is required".to_string(),
            });
        }
        self.base_domain()?;

        let backend = url::Url::parse(&format!("http://{}", self.proxy.backend_upstream))
            .map_err(|e| SettingsError::Invalid {
                key: "proxy.backend_upstream",
                message: e.to_string(),
            })?;
        let has_port = self
            .proxy
            .backend_upstream
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if backend.host_str().is_none() || !has_port || backend.path() != "/" {
            return Err(SettingsError::Invalid {
                key: "proxy.backend_upstream",
                message: "expected host:port".to_string(),
            });
        }

        if !self.proxy.api_prefix.starts_with('/') {
            return Err(SettingsError::Invalid {
                key: "proxy.api_prefix",
                message: "must start with '/'".to_string(),
            });
        }
        if self.proxy.reload_command.is_empty() {
            return Err(SettingsError::Invalid {
                key: "proxy.reload_command",
                message: "must not be empty".to_string(),
            });
        }
        if self.dns.timeout_secs == 0
            || self.proxy.command_timeout_secs == 0
            || self.certs.issue_timeout_secs == 0
        {
            return Err(SettingsError::Invalid {
                key: "timeouts",
                message: "timeouts must be > 0".to_string(),
            });
        }
        if self.certs.renewal_threshold_days <= 0 {
            return Err(SettingsError::Invalid {
                key: "certs.renewal_threshold_days",
                message: "must be > 0".to_string(),
            });
        }
        if self.certs.renewal_interval_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "certs.renewal_interval_secs",
                message: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
