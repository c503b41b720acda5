use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tenant_guard::auth::AuthState;
use tenant_guard::config;
use tenant_guard::observability::init_logging;
use tenant_guard::server;

#[derive(Parser, Debug)]
#[command(name = "tenant-guard")]
#[command(about = "Multi-tenant request authentication service", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TENANT_GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind host
    #[arg(long)]
    host: Option<IpAddr>,

    /// HTTP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Precedence: CLI > env > file > defaults
    let mut settings = if let Some(ref path) = args.config {
        config::load_settings_from_path(path)?
    } else {
        config::load_settings()?
    };

    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if args.verbose {
        settings.logging.level = "debug".to_string();
    }
    if args.json_logs {
        settings.logging.json = true;
    }
    settings.validate()?;

    init_logging(&settings.logging);

    #[cfg(feature = "metrics")]
    tenant_guard::observability::init_metrics()?;

    tracing::info!("Starting tenant-guard");
    tracing::info!("Bearer mode: {}", settings.bearer);
    tracing::info!("HMAC authenticators: {}", settings.hmac.len());

    let chain = settings.authenticator().await?;
    let app = server::router(AuthState::new(chain));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
        }
        tracing::info!("Shutdown signal received");
    };

    server::serve(app, settings.server.host, settings.server.port, shutdown).await?;
    Ok(())
}
