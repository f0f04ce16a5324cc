//! Controller behaviour against scripted DNS, proxy and certificate doubles.

use std::time::Duration;

use portico_certs::CertError;
use portico_provision::testing::{Harness, OWNER};
use portico_provision::{DomainConfig, ProvisionError, ProvisioningState, ProvisionStep};

const DOMAIN: &str = "shop.example.com";

// ── DNS ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn dns_check_is_persisted_whatever_the_outcome() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;

    h.point_dns_elsewhere(DOMAIN);
    let check = h.controller.verify_dns(&ws.id).await.unwrap();
    assert!(!check.verified);
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(!status.dns_verified);
    assert!(status.error_message.unwrap().contains("198.51.100.7"));

    h.point_dns(DOMAIN);
    assert!(h.controller.verify_dns(&ws.id).await.unwrap().verified);
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.dns_verified);
    assert!(status.error_message.is_none(), "success clears the error");
    assert_eq!(status.state, Some(ProvisioningState::DnsVerified));
}

#[tokio::test]
async fn subdomain_workspace_is_verified_without_a_record() {
    let h = Harness::new();
    let ws = h.subdomain_workspace("acme").await;

    let check = h.controller.verify_dns(&ws.id).await.unwrap();
    assert!(check.verified);
    assert!(h.controller.list_status().await.is_empty());
}

#[tokio::test]
async fn dns_regression_does_not_tear_down() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    assert!(h.controller.full_provision(&ws.id).await.unwrap().overall_success);

    h.point_dns_elsewhere(DOMAIN);
    assert!(!h.controller.verify_dns(&ws.id).await.unwrap().verified);

    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(!status.dns_verified);
    assert!(status.nginx_configured);
    assert!(status.ssl_active);
    assert!(h.vhost(DOMAIN).is_some());
}

// ── Proxy ───────────────────────────────────────────────────────────

#[tokio::test]
async fn nginx_requires_verified_dns_and_creates_nothing() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;

    let err = h.controller.provision_nginx(&ws.id).await.unwrap_err();
    assert!(matches!(err, ProvisionError::PreconditionFailed(_)));
    assert!(h.vhost(DOMAIN).is_none());
    assert_eq!(h.control.reload_count(), 0);
    assert!(!h.controller.status(&ws.id).await.unwrap().nginx_configured);
}

#[tokio::test]
async fn provision_nginx_is_idempotent() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();

    let first = h.controller.provision_nginx(&ws.id).await.unwrap();
    let config = h.vhost(DOMAIN).unwrap();
    let second = h.controller.provision_nginx(&ws.id).await.unwrap();

    assert!(first.success && second.success);
    assert_eq!(h.vhost(DOMAIN).unwrap(), config);
    let entries = std::fs::read_dir(h.root.join("sites")).unwrap().count();
    assert_eq!(entries, 1, "exactly one vhost file");
    assert!(h.controller.status(&ws.id).await.unwrap().nginx_configured);
}

#[tokio::test]
async fn vhost_serves_http_until_a_certificate_exists() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();
    h.controller.provision_nginx(&ws.id).await.unwrap();
    assert!(!h.vhost(DOMAIN).unwrap().contains("listen 443"));

    assert!(h.controller.provision_ssl(&ws.id).await.unwrap().success);
    let config = h.vhost(DOMAIN).unwrap();
    assert!(config.contains("listen 443 ssl;"));
    assert!(config.contains("return 301 https://$host$request_uri;"));
}

#[tokio::test]
async fn validation_failure_keeps_previous_vhost() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();
    h.controller.provision_nginx(&ws.id).await.unwrap();
    let previous = h.vhost(DOMAIN).unwrap();

    h.control.fail_validation("nginx: [emerg] unknown directive \"proxy_passs\"");
    let step = h.controller.provision_nginx(&ws.id).await.unwrap();

    assert!(!step.success);
    assert!(step.message.contains("unknown directive"));
    assert_eq!(h.vhost(DOMAIN).unwrap(), previous);
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.nginx_configured, "last good config is still active");
    assert!(status.error_message.unwrap().contains("unknown directive"));
}

#[tokio::test]
async fn preview_has_no_side_effects() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;

    let preview = h.controller.preview_nginx_config(&ws.id).await.unwrap();
    assert!(preview.contains("server_name shop.example.com www.shop.example.com;"));
    assert!(h.vhost(DOMAIN).is_none());
    assert_eq!(h.control.validate_count(), 0);
    assert_eq!(
        h.controller.status(&ws.id).await.unwrap().state,
        Some(ProvisioningState::Unconfigured)
    );
}

// ── Certificates ────────────────────────────────────────────────────

#[tokio::test]
async fn ssl_requires_nginx() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();

    let err = h.controller.provision_ssl(&ws.id).await.unwrap_err();
    assert!(matches!(err, ProvisionError::PreconditionFailed(_)));
    assert_eq!(h.issuer.issued_count(), 0);
    assert!(!h.controller.status(&ws.id).await.unwrap().ssl_active);
}

#[tokio::test]
async fn ssl_failure_leaves_nginx_configured() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();
    h.controller.provision_nginx(&ws.id).await.unwrap();

    h.issuer
        .fail_next(CertError::ChallengeFailed("Invalid response from http://shop.example.com".into()));
    let step = h.controller.provision_ssl(&ws.id).await.unwrap();

    assert!(!step.success);
    assert!(step.message.contains("Invalid response"));
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.nginx_configured);
    assert!(!status.ssl_active);
    assert!(status.ssl_expiry.is_none());
}

#[tokio::test]
async fn reissuing_an_active_certificate_is_harmless() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    assert!(h.controller.full_provision(&ws.id).await.unwrap().overall_success);
    let reloads = h.control.reload_count();

    assert!(h.controller.provision_ssl(&ws.id).await.unwrap().success);
    assert_eq!(h.control.reload_count(), reloads, "vhost already active, no re-apply");
    assert_eq!(h.issuer.issued_count(), 2);
}

// ── Pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn full_provision_stops_at_dns() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;

    let report = h.controller.full_provision(&ws.id).await.unwrap();
    assert!(!report.overall_success);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].step, ProvisionStep::Dns);
    assert!(h.vhost(DOMAIN).is_none());
}

#[tokio::test]
async fn full_provision_keeps_nginx_when_ssl_fails() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.issuer
        .fail_next(CertError::RateLimited("too many certificates already issued".into()));

    let report = h.controller.full_provision(&ws.id).await.unwrap();

    assert!(!report.overall_success);
    let outcomes: Vec<(ProvisionStep, bool)> =
        report.steps.iter().map(|s| (s.step, s.success)).collect();
    assert_eq!(
        outcomes,
        vec![
            (ProvisionStep::Dns, true),
            (ProvisionStep::Nginx, true),
            (ProvisionStep::Ssl, false)
        ]
    );
    assert!(h.vhost(DOMAIN).is_some(), "nginx is not rolled back");
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.nginx_configured && !status.ssl_active);
    assert_eq!(status.state, Some(ProvisioningState::NginxConfigured));
}

#[tokio::test]
async fn full_provision_success_sets_every_flag() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);

    let report = h.controller.full_provision(&ws.id).await.unwrap();
    assert!(report.overall_success);
    assert_eq!(report.steps.len(), 3);

    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.dns_verified && status.nginx_configured && status.ssl_active);
    assert!(status.ssl_expiry.is_some());
    assert_eq!(status.state, Some(ProvisioningState::SslActive));
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_provision_nginx_one_wins() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.verify_dns(&ws.id).await.unwrap();
    h.control.delay_reloads(Duration::from_millis(200));

    let (a, b) = tokio::join!(
        h.controller.provision_nginx(&ws.id),
        h.controller.provision_nginx(&ws.id)
    );

    let results = [a, b];
    let wins = results.iter().filter(|r| matches!(r, Ok(s) if s.success)).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(ProvisionError::InProgress(_))))
        .count();
    assert_eq!((wins, busy), (1, 1));
    assert_eq!(h.control.reload_count(), 1);
}

#[tokio::test]
async fn different_workspaces_do_not_block_each_other() {
    let h = Harness::new();
    let a = h.custom_workspace("a.example.com").await;
    let b = h.custom_workspace("b.example.com").await;
    for d in ["a.example.com", "b.example.com"] {
        h.point_dns(d);
    }
    h.control.delay_reloads(Duration::from_millis(50));

    let (ra, rb) = tokio::join!(
        h.controller.full_provision(&a.id),
        h.controller.full_provision(&b.id)
    );
    assert!(ra.unwrap().overall_success);
    assert!(rb.unwrap().overall_success);
}

#[tokio::test]
async fn status_reads_are_allowed_during_an_operation() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.control.delay_reloads(Duration::from_millis(200));

    let controller = h.controller.clone();
    let id = ws.id.clone();
    let running = tokio::spawn(async move { controller.full_provision(&id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.controller.status(&ws.id).await.is_ok());
    assert!(matches!(
        h.controller.verify_dns(&ws.id).await,
        Err(ProvisionError::InProgress(_))
    ));
    assert!(matches!(
        h.controller.remove_config(&ws.id).await,
        Err(ProvisionError::InProgress(_))
    ));
    assert!(running.await.unwrap().unwrap().overall_success);
}

// ── Removal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn remove_config_clears_flags_but_keeps_dns() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    let step = h.controller.remove_config(&ws.id).await.unwrap();
    assert!(step.success);
    assert!(h.vhost(DOMAIN).is_none());

    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.dns_verified);
    assert!(!status.nginx_configured && !status.ssl_active);
    assert!(status.ssl_expiry.is_none());
    assert_eq!(status.state, Some(ProvisioningState::Removed));

    // A fresh check moves it out of the terminal state.
    assert!(h.controller.verify_dns(&ws.id).await.unwrap().verified);
    let status = h.controller.status(&ws.id).await.unwrap();
    assert_eq!(status.state, Some(ProvisioningState::DnsVerified));
}

#[tokio::test]
async fn failed_removal_is_not_reported_as_removed() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    h.control.fail_reloads(1, "reload refused");
    assert!(!h.controller.remove_config(&ws.id).await.unwrap().success);
    let status = h.controller.status(&ws.id).await.unwrap();
    assert_ne!(status.state, Some(ProvisioningState::Removed));
}

#[tokio::test]
async fn remove_config_is_idempotent() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    assert!(h.controller.remove_config(&ws.id).await.unwrap().success);
    let again = h.controller.remove_config(&ws.id).await.unwrap();
    assert!(again.success);
    assert!(again.message.contains("Nothing to remove"));
}

#[tokio::test]
async fn remove_reload_failure_keeps_vhost() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    h.control.fail_reloads(1, "reload refused");
    let step = h.controller.remove_config(&ws.id).await.unwrap();

    assert!(!step.success);
    assert!(step.message.contains("reload refused"), "{}", step.message);
    assert!(h.vhost(DOMAIN).is_some());
    let status = h.controller.status(&ws.id).await.unwrap();
    assert!(status.nginx_configured);
    // The certificate went first, so HTTPS is no longer active.
    assert!(!status.ssl_active);
    assert!(status.error_message.is_some());
}

// ── Workspaces ──────────────────────────────────────────────────────

#[tokio::test]
async fn custom_domain_belongs_to_one_workspace() {
    let h = Harness::new();
    let first = h.custom_workspace(DOMAIN).await;

    let err = h
        .controller
        .create_workspace(
            "Other",
            OWNER,
            DomainConfig::CustomDomain {
                domain: DOMAIN.parse_domain(),
            },
        )
        .await
        .unwrap_err();
    match err {
        ProvisionError::DomainTaken { workspace_id, .. } => assert_eq!(workspace_id, first.id),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn platform_names_cannot_be_custom_domains() {
    let h = Harness::new();
    let err = h
        .controller
        .create_workspace(
            "Sneaky",
            OWNER,
            DomainConfig::CustomDomain {
                domain: "acme.example-platform.com".parse_domain(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidDomain(_)));
}

#[tokio::test]
async fn change_domain_tears_down_and_starts_fresh() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    let updated = h
        .controller
        .change_domain(
            &ws.id,
            DomainConfig::CustomDomain {
                domain: "store.example.net".parse_domain(),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.slug, ws.slug);
    assert!(h.vhost(DOMAIN).is_none());
    let status = h.controller.status(&ws.id).await.unwrap();
    assert_eq!(status.domain, "store.example.net");
    assert_eq!(status.state, Some(ProvisioningState::Unconfigured));
}

#[tokio::test]
async fn delete_workspace_cascades() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.controller.full_provision(&ws.id).await.unwrap();

    h.controller.delete_workspace(&ws.id).await.unwrap();

    assert!(h.vhost(DOMAIN).is_none());
    assert!(h.controller.list_status().await.is_empty());
    assert!(matches!(
        h.controller.status(&ws.id).await,
        Err(ProvisionError::WorkspaceNotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_creates_for_one_domain_admit_one_workspace() {
    let h = Harness::new();
    let config = || DomainConfig::CustomDomain {
        domain: DOMAIN.parse_domain(),
    };

    let (a, b) = tokio::join!(
        h.controller.create_workspace("Shop A", OWNER, config()),
        h.controller.create_workspace("Shop B", OWNER, config()),
    );
    let taken = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(ProvisionError::DomainTaken { .. })))
        .count();
    assert_eq!((a.is_ok() as u8 + b.is_ok() as u8, taken), (1, 1));
    assert_eq!(h.controller.list_status().await.len(), 1);
}

// ── Lock coverage for DNS checks ────────────────────────────────────

#[tokio::test]
async fn dns_check_in_flight_blocks_a_domain_change() {
    let h = Harness::new();
    let ws = h.custom_workspace("old.example.com").await;
    h.point_dns("old.example.com");
    h.lookup.delay(Duration::from_millis(300));

    let controller = h.controller.clone();
    let id = ws.id.clone();
    let check = tokio::spawn(async move { controller.verify_dns(&id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let new_domain = || DomainConfig::CustomDomain {
        domain: "new.example.org".parse_domain(),
    };
    assert!(matches!(
        h.controller.change_domain(&ws.id, new_domain()).await,
        Err(ProvisionError::InProgress(_))
    ));
    assert!(check.await.unwrap().unwrap().verified);

    h.controller.change_domain(&ws.id, new_domain()).await.unwrap();
    let status = h.controller.status(&ws.id).await.unwrap();
    assert_eq!(status.domain, "new.example.org");
    assert!(!status.dns_verified, "old domain's check leaked into the new record");

    assert!(matches!(
        h.controller.provision_nginx(&ws.id).await,
        Err(ProvisionError::PreconditionFailed(_))
    ));
    assert!(h.vhost("new.example.org").is_none());
}

#[tokio::test]
async fn dns_check_in_flight_blocks_workspace_deletion() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);
    h.lookup.delay(Duration::from_millis(300));

    let controller = h.controller.clone();
    let id = ws.id.clone();
    let check = tokio::spawn(async move { controller.verify_dns(&id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        h.controller.delete_workspace(&ws.id).await,
        Err(ProvisionError::InProgress(_))
    ));
    check.await.unwrap().unwrap();

    h.controller.delete_workspace(&ws.id).await.unwrap();
    assert!(h.controller.list_status().await.is_empty());
    assert!(matches!(
        h.controller.verify_dns(&ws.id).await,
        Err(ProvisionError::WorkspaceNotFound(_))
    ));
    assert!(h.controller.list_status().await.is_empty());
}

// ── Certificate names ───────────────────────────────────────────────

#[tokio::test]
async fn www_is_requested_only_when_it_reaches_the_ingress() {
    let h = Harness::new();
    let ws = h.custom_workspace(DOMAIN).await;
    h.point_dns(DOMAIN);

    assert!(h.controller.full_provision(&ws.id).await.unwrap().overall_success);
    assert!(h.issuer.last_alt_names().is_empty());

    h.point_dns_elsewhere("www.shop.example.com");
    assert!(h.controller.provision_ssl(&ws.id).await.unwrap().success);
    assert!(h.issuer.last_alt_names().is_empty());

    h.point_dns("www.shop.example.com");
    assert!(h.controller.provision_ssl(&ws.id).await.unwrap().success);
    assert_eq!(
        h.issuer.last_alt_names(),
        vec!["www.shop.example.com".parse_domain()]
    );
}

#[tokio::test]
async fn www_domain_gets_no_duplicate_alt_name() {
    let h = Harness::new();
    let ws = h.custom_workspace("www.shop.example.com").await;
    h.point_dns("www.shop.example.com");

    assert!(h.controller.full_provision(&ws.id).await.unwrap().overall_success);
    assert!(h.issuer.last_alt_names().is_empty());
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn setup_automated_reuses_existing_workspace() {
    let h = Harness::new();
    h.point_dns(DOMAIN);

    let first = h.controller.setup_automated(DOMAIN, OWNER).await.unwrap();
    assert!(first.created && first.success);

    let second = h.controller.setup_automated("shop.example.com.", OWNER).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.workspace_id, first.workspace_id);
    assert_eq!(second.steps_completed, vec!["dns", "nginx", "ssl"]);
}

#[tokio::test]
async fn setup_automated_refuses_another_owners_domain() {
    let h = Harness::new();
    h.custom_workspace(DOMAIN).await;

    let err = h
        .controller
        .setup_automated(DOMAIN, "someone-else")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::DomainTaken { .. }));
}

#[tokio::test]
async fn setup_automated_for_platform_subdomain() {
    let h = Harness::new();
    let report = h
        .controller
        .setup_automated("acme.example-platform.com", OWNER)
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.created);
    assert_eq!(report.steps_completed, vec!["workspace"]);
    assert!(h.controller.list_status().await.is_empty());
}

#[tokio::test]
async fn setup_automated_reports_partial_progress() {
    let h = Harness::new();
    let report = h.controller.setup_automated(DOMAIN, OWNER).await.unwrap();

    assert!(!report.success);
    assert!(report.created);
    assert_eq!(report.steps_completed, vec!["workspace"]);
}

// ── Listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn list_status_joins_workspace_names() {
    let h = Harness::new();
    h.custom_workspace("b.example.com").await;
    h.custom_workspace("a.example.com").await;
    h.subdomain_workspace("acme").await;

    let list = h.controller.list_status().await;
    let domains: Vec<&str> = list.iter().map(|v| v.domain.as_str()).collect();
    assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
    assert_eq!(list[0].workspace_name, "a.example.com");
    assert!(list.iter().all(|v| v.state.is_none()));
}

trait ParseDomain {
    fn parse_domain(&self) -> portico_common::domain::DomainName;
}

impl ParseDomain for str {
    fn parse_domain(&self) -> portico_common::domain::DomainName {
        portico_common::domain::DomainName::parse(self).unwrap()
    }
}
