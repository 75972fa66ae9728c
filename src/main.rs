use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use smppserver::config::Config;
use smppserver::telemetry::{counters, init_tracing};
use smppserver::SmppServer;

#[derive(Parser, Debug)]
#[command(name = "smppserver")]
#[command(author, version, about = "SMPP server endpoint")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    init_tracing(&config.telemetry.tracing("smppserver"))?;
    counters::init(&opentelemetry::global::meter("smppserver"));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.name,
        address = %config.server.address,
        window_size = config.session.window_size,
        "configuration loaded"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let server = SmppServer::new(config.server, config.session);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");

    server.stop().await;
    Ok(())
}
