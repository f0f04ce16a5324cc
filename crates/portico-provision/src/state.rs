use serde::Serialize;

use crate::status::DomainStatus;

/// Where a workspace's custom domain stands, derived from its status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Unconfigured,
    DnsVerified,
    NginxConfigured,
    SslActive,
    /// Proxy config and certificate were removed, or the record is gone.
    Removed,
}

impl ProvisioningState {
    /// A live proxy config outranks the removed marker, which outranks a
    /// DNS result kept from before the removal.
    pub fn of(status: Option<&DomainStatus>) -> Self {
        match status {
            None => Self::Removed,
            Some(s) if s.ssl_active => Self::SslActive,
            Some(s) if s.nginx_configured => Self::NginxConfigured,
            Some(s) if s.removed => Self::Removed,
            Some(s) if s.dns_verified => Self::DnsVerified,
            Some(_) => Self::Unconfigured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_common::domain::DomainName;

    fn status() -> DomainStatus {
        DomainStatus::new("ws-1", DomainName::parse("shop.example.com").unwrap())
    }

    #[test]
    fn flags_take_precedence_from_ssl_down() {
        let mut s = status();
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::Unconfigured);

        s.dns_verified = true;
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::DnsVerified);

        s.nginx_configured = true;
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::NginxConfigured);

        s.ssl_active = true;
        s.dns_verified = false;
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::SslActive);
    }

    #[test]
    fn removed_marker_hides_stale_dns_result() {
        let mut s = status();
        s.dns_verified = true;
        s.removed = true;
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::Removed);

        s.nginx_configured = true;
        assert_eq!(ProvisioningState::of(Some(&s)), ProvisioningState::NginxConfigured);
    }

    #[test]
    fn missing_record_is_removed() {
        assert_eq!(ProvisioningState::of(None), ProvisioningState::Removed);
        assert_eq!(
            serde_json::to_value(ProvisioningState::NginxConfigured).unwrap(),
            "nginx_configured"
        );
    }
}
