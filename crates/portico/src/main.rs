mod adapters;
pub(crate) mod cli;
mod openapi;
mod wiring;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use portico_common::domain::{CertPaths, DomainName};
use portico_config::Settings;
use portico_proxy::TlsStage;

/// Maximum time to wait for orderly shutdown before forcing exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Brief pause after cancellation to let in-flight requests complete.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => cli.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Hold the non-blocking guards for the lifetime of main so logs flush on exit.
    let _log_guards = init_logging(env_filter, cli.log_file.as_deref())?;

    // ── Synchronous subcommands (no runtime needed) ──────────────────
    match &cli.command {
        Some(Command::Version) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "platform": std::env::consts::OS,
                    })
                );
            } else {
                println!("portico {}", env!("CARGO_PKG_VERSION"));
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::Preview { domain }) => {
            let settings = Settings::load(cli.config.as_deref())?;
            preview(&settings, domain)?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Some(Command::CheckDns { domain }) = &cli.command {
        let settings = Settings::load(cli.config.as_deref())?;
        return check_dns(&settings, domain, cli.json).await;
    }

    serve(cli).await?;
    Ok(ExitCode::SUCCESS)
}

// ── Daemon ──────────────────────────────────────────────────────────

async fn serve(cli: Cli) -> anyhow::Result<()> {
    portico_config::dirs::ensure_data_dir();
    let settings = Settings::load(cli.config.as_deref())?;
    startup_diagnostics(&cli, &settings);

    let controller = wiring::build_controller(&settings)?;
    let started_at = std::time::Instant::now();
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let renewal = if cli.no_renewal {
        None
    } else {
        let runtime = Arc::new(wiring::renewal_runtime(&settings, controller.clone()));
        runtime.start().await;
        Some(runtime)
    };

    {
        let app = adapters::http::router(controller.clone(), renewal.clone(), started_at);
        let bind = cli.bind.clone();
        let port = cli.port;
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = adapters::http::start(app, bind, port, token.clone()).await {
                tracing::error!(error = %e, "HTTP adapter failed");
                token.cancel();
            }
        }));
    }

    tracing::info!("Ready.");

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = cancel.cancelled() => {}
    }
    tracing::info!("Shutting down...");

    // Ordered shutdown with hard timeout
    let shutdown = async {
        cancel.cancel();
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        for task in tasks {
            let _ = task.await;
        }
        if let Some(runtime) = &renewal {
            runtime.stop().await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
        tracing::warn!("Shutdown timed out after {:?}, forcing exit", SHUTDOWN_TIMEOUT);
    }

    Ok(())
}

fn startup_diagnostics(cli: &Cli, settings: &Settings) {
    tracing::info!("Portico v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {}", std::env::consts::OS);
    tracing::info!("Base domain: {}", settings.platform.base_domain);
    let ingress: Vec<String> = settings.platform.ingress_ips.iter().map(|ip| ip.to_string()).collect();
    tracing::info!("Ingress addresses: {}", ingress.join(", "));
    tracing::info!("Virtual hosts: {}", settings.proxy.sites_dir().display());
    tracing::info!("Certificate store: {}", settings.certs.store_root().display());
    if settings.certs.staging {
        tracing::warn!("Using the ACME staging environment; certificates will not be trusted");
    }
    if cli.no_renewal {
        tracing::info!("Certificate renewal: disabled");
    } else {
        tracing::info!(
            "Certificate renewal: every {}s, {} days before expiry",
            settings.certs.renewal_interval().as_secs(),
            settings.certs.renewal_threshold_days
        );
    }
}

/// Wait for Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── One-shot commands ───────────────────────────────────────────────

fn preview(settings: &Settings, domain: &str) -> anyhow::Result<()> {
    let domain = DomainName::parse(domain)?;
    let stage = if CertPaths::for_domain(&settings.certs.store_root(), &domain).installed() {
        TlsStage::Active
    } else {
        TlsStage::Pending
    };
    print!("{}", portico_proxy::render(&wiring::vhost_template(settings), &domain, stage));
    Ok(())
}

async fn check_dns(settings: &Settings, domain: &str, json: bool) -> anyhow::Result<ExitCode> {
    let domain = DomainName::parse(domain)?;
    let check = wiring::dns_verifier(settings).verify(&domain).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        let marker = if check.verified { "+" } else { "-" };
        println!("[{marker}] {}", check.message);
        if !check.observed_addresses.is_empty() {
            println!("    observed: {}", check.observed_addresses.join(", "));
        }
    }

    Ok(if check.verified {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ── Logging setup ───────────────────────────────────────────────────

/// Initialize tracing with stderr + optional file output.
/// Returns guards that must be held for the lifetime of the program
/// to ensure the non-blocking writers flush on shutdown.
pub(crate) fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}
