//! Warden Web Server
//!
//! Identity provider: accounts, sessions, bearer tokens and permission gates.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use warden_core::{init_logging, WardenConfig};
use warden_web::WardenServerBuilder;

/// Warden Web Server - authentication and authorization service
#[derive(Parser)]
#[command(name = "warden-web")]
#[command(about = "Authentication and authorization service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    /// Database URL, e.g. sqlite://warden.db?mode=rwc
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut WardenConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.dev {
            config.server.dev_mode = true;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables before the config layer reads them
    dotenvy::dotenv().ok();

    let mut config =
        WardenConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.logging).context("failed to initialize logging")?;

    info!("Starting Warden Web Server");
    info!("Server: http://{}", config.server.address());
    info!("Database: {}", config.database.url);

    let server = WardenServerBuilder::from_config(config)
        .build()
        .await
        .context("failed to build server")?;

    server.start().await.context("server terminated")?;
    Ok(())
}
