//! Withdrawal monitor binary
//!
//! Polls every configured partner backend and serves the aggregate
//! withdrawal counts over HTTP.
//!
//! # Usage
//!
//! ```bash
//! withdrawal-monitor --config monitor.toml --sites sites.json --port 4417
//! withdrawal-monitor --sites sites.json --once --otp terminal
//! ```

use clap::Parser;
use std::path::PathBuf;
use withdrawal_monitor::{
    cli::{ServerArgs, run_server_mode},
    config::OtpMode,
};

/// Multi-tenant withdrawal monitor
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tenant list (JSON array or TOML with [[tenants]])
    #[arg(short, long, value_name = "FILE")]
    sites: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds between refresh batches
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Where OTP prompts are answered
    #[arg(long, value_enum)]
    otp: Option<OtpMode>,

    /// Send tenant requests through this relay endpoint
    #[arg(long, value_name = "URL")]
    proxy_url: Option<String>,

    /// Keep tokens in memory only
    #[arg(long)]
    no_persist: bool,

    /// Run a single refresh batch, print the snapshot and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    run_server_mode(ServerArgs {
        config: cli.config,
        sites: cli.sites,
        host: cli.host,
        port: cli.port,
        interval: cli.interval,
        otp: cli.otp,
        proxy_url: cli.proxy_url,
        no_persist: cli.no_persist,
        once: cli.once,
        verbose: cli.verbose,
    })
    .await
}
