//! remote-dl server entry point.

use clap::Parser;
use remote_dl::{server, EngineConfig, TransferCoordinator};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Parser)]
#[command(name = "remote-dl", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory transfers are written to (overrides the config file)
    #[arg(short, long)]
    download_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(addr) = args.bind {
        config = config.bind_addr(addr);
    }
    if let Some(dir) = args.download_dir {
        config = config.download_dir(dir);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind_addr,
        "starting remote-dl"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("remote-dl shut down cleanly");
    Ok(())
}

async fn run(config: EngineConfig) -> anyhow::Result<()> {
    let addr = config.server.bind_addr;
    let coordinator = TransferCoordinator::new(config).await?;

    server::serve(addr, coordinator.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
        }
        tracing::info!("Shutdown requested");
    })
    .await?;

    coordinator.shutdown().await?;
    Ok(())
}
