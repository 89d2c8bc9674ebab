//! Device Integrity Agent CLI.

use anyhow::Result;
use clap::Parser;
use device_integrity::api::{self, ApiState};
use device_integrity::{Config, IntegrityAgent};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "device-integrity")]
#[command(about = "Device integrity agent - resolve device identifiers to ban decisions")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.listen
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            warn!("No configuration file given, using defaults");
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.server.listen = listen.to_string();
    }
    let addr: SocketAddr = config.server.listen.parse()?;

    let (agent, _stores) = IntegrityAgent::from_config(&config).await?;
    let state = Arc::new(ApiState {
        agent: Arc::new(agent),
        config: Arc::new(config),
    });

    api::serve(addr, state).await
}
