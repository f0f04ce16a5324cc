//! nginx virtual host rendering. Pure: same inputs, same text.

use std::fmt::Write;
use std::path::PathBuf;

use portico_common::domain::{CertPaths, DomainName};

/// Static parts of every rendered virtual host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostTemplate {
    /// `host:port` of the application backend.
    pub backend_upstream: String,
    pub api_prefix: String,
    pub frontend_root: PathBuf,
    pub acme_webroot: PathBuf,
    pub cert_store_root: PathBuf,
}

/// Whether the HTTPS server block is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStage {
    /// No certificate yet: HTTP serves the application directly.
    Pending,
    /// Certificate installed: HTTP redirects, HTTPS serves.
    Active,
}

/// Compressed response types.
const GZIP_TYPES: &str = "text/plain text/css text/xml text/javascript application/json \
                          application/javascript application/xml application/rss+xml image/svg+xml";

/// Render the virtual host for `domain` and its `www.` variant.
///
/// The ACME challenge location is present in both stages so issuance and
/// renewal always have an HTTP path to the webroot.
pub fn render(template: &VhostTemplate, domain: &DomainName, stage: TlsStage) -> String {
    let server_names = server_names(domain);
    let mut out = String::new();

    let _ = writeln!(out, "# Managed by portico for {domain}. Manual edits are overwritten.");
    out.push('\n');

    out.push_str("server {\n");
    out.push_str("    listen 80;\n");
    out.push_str("    listen [::]:80;\n");
    let _ = writeln!(out, "    server_name {server_names};");
    out.push('\n');
    out.push_str("    location ^~ /.well-known/acme-challenge/ {\n");
    let _ = writeln!(out, "        root {};", template.acme_webroot.display());
    out.push_str("        default_type \"text/plain\";\n");
    out.push_str("    }\n");
    out.push('\n');
    match stage {
        TlsStage::Active => {
            out.push_str("    location / {\n");
            out.push_str("        return 301 https://$host$request_uri;\n");
            out.push_str("    }\n");
        }
        TlsStage::Pending => app_locations(&mut out, template),
    }
    out.push_str("}\n");

    if stage == TlsStage::Active {
        let certs = CertPaths::for_domain(&template.cert_store_root, domain);
        out.push('\n');
        out.push_str("server {\n");
        out.push_str("    listen 443 ssl;\n");
        out.push_str("    listen [::]:443 ssl;\n");
        let _ = writeln!(out, "    server_name {server_names};");
        out.push('\n');
        let _ = writeln!(out, "    ssl_certificate {};", certs.fullchain.display());
        let _ = writeln!(out, "    ssl_certificate_key {};", certs.private_key.display());
        out.push_str("    ssl_protocols TLSv1.2 TLSv1.3;\n");
        out.push_str("    ssl_prefer_server_ciphers off;\n");
        out.push_str("    ssl_session_timeout 1d;\n");
        out.push('\n');
        app_locations(&mut out, template);
        out.push_str("}\n");
    }

    out
}

fn server_names(domain: &DomainName) -> String {
    let www = domain.www();
    if www == domain.as_str() {
        www
    } else {
        format!("{domain} {www}")
    }
}

fn app_locations(out: &mut String, template: &VhostTemplate) {
    out.push_str("    client_max_body_size 25m;\n");
    out.push('\n');
    out.push_str("    gzip on;\n");
    out.push_str("    gzip_vary on;\n");
    out.push_str("    gzip_proxied any;\n");
    out.push_str("    gzip_min_length 1024;\n");
    let _ = writeln!(out, "    gzip_types {GZIP_TYPES};");
    out.push('\n');
    let _ = writeln!(out, "    location {} {{", template.api_prefix);
    let _ = writeln!(out, "        proxy_pass http://{};", template.backend_upstream);
    out.push_str("        proxy_http_version 1.1;\n");
    out.push_str("        proxy_set_header Host $host;\n");
    out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
    out.push_str("    }\n");
    out.push('\n');
    out.push_str("    location / {\n");
    let _ = writeln!(out, "        root {};", template.frontend_root.display());
    out.push_str("        index index.html;\n");
    out.push_str("        try_files $uri $uri/ /index.html;\n");
    out.push_str("    }\n");
}
