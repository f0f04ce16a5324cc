//! Portico data directory initialization.
//!
//! Ensures the data directory exists and contains a commented
//! `config.toml` if not already present. Called once during daemon
//! startup.

use portico_common::paths;

/// Default content for a freshly created config.toml.
pub const DEFAULT_CONFIG_TOML: &str = "\
# Portico configuration

[platform]
# Public ingress address(es) custom domains must point at.
ingress_ips = []
# Base domain for platform subdomains.
base_domain = \"example-platform.com\"

# [proxy]
# sites_dir = \"/etc/nginx/sites-enabled\"
# backend_upstream = \"127.0.0.1:8000\"
# frontend_root = \"/var/www/app/dist\"
# acme_webroot = \"/var/www/acme\"

# [certs]
# store_root = \"/etc/letsencrypt\"
# contact_email = \"ops@example-platform.com\"
";

/// Ensure the Portico data directory structure exists.
///
/// Creates the data directory, `state/`, `logs/`, and a default
/// `config.toml` when absent. Errors are logged but not fatal.
pub fn ensure_data_dir() {
    let data_dir = paths::portico_data_dir();

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::warn!(
            path = %data_dir.display(),
            error = %e,
            "Could not create data directory"
        );
        return;
    }

    for path in [paths::portico_state_dir(), paths::portico_log_dir()] {
        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not create subdirectory"
            );
        }
    }

    let config_path = data_dir.join("config.toml");
    if !config_path.exists() {
        match std::fs::write(&config_path, DEFAULT_CONFIG_TOML) {
            Ok(()) => tracing::debug!(path = %config_path.display(), "Created default config"),
            Err(e) => tracing::warn!(
                path = %config_path.display(),
                error = %e,
                "Could not write default config"
            ),
        }
    }

    tracing::debug!(path = %data_dir.display(), "Data directory ready");
}
