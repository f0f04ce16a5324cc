use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: u16 = 7480;

#[derive(Parser, Debug)]
#[command(
    name = "portico",
    version,
    about = "Custom domains for workspaces: DNS checks, nginx vhosts and ACME certificates"
)]
pub struct Cli {
    /// Settings file (default: config.toml in the data directory)
    #[arg(long, env = "PORTICO_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "PORTICO_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Address the HTTP API binds to
    #[arg(long, env = "PORTICO_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "PORTICO_LOG", default_value = "info")]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "PORTICO_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Do not run the background certificate renewal loop
    #[arg(long, env = "PORTICO_NO_RENEWAL")]
    pub no_renewal: bool,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the provisioning daemon (default)
    Serve,
    /// Show version information
    Version,
    /// Print the nginx virtual host that would be written for a domain
    Preview {
        domain: String,
    },
    /// Check whether a domain resolves to the platform ingress
    CheckDns {
        domain: String,
    },
}
