use anyhow::{Context, Result};
use clap::Parser;
use livecue::simulation::{spawn_server, SimConfig};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::info;

/// Serve a simulated competition clock in the shape of the SRComp API.
#[derive(Parser, Debug)]
#[command(name = "livecue-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// The port to bind the server to
    #[arg(short, long, default_value_t = 8008)]
    port: u16,

    /// Seconds to wait before the first match slot begins
    #[arg(long, default_value_t = 0.0)]
    start_delay: f64,

    /// The match number to use for the first match
    #[arg(long, default_value_t = 0)]
    start_match: u32,

    /// The highest match to run
    #[arg(long)]
    end_match: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    // 2. Describe the competition to simulate.
    let delay = Duration::try_from_secs_f64(args.start_delay)
        .context("--start-delay must be a non-negative number of seconds")?;
    let config = SimConfig::starting_in(delay).with_matches(args.start_match, args.end_match);

    // 3. Serve it until Ctrl+C.
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, args.port));
    let (_, server) = spawn_server(addr, config)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tokio::select! {
        result = server => result.context("Server task failed")?.context("Server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received."),
    }
    Ok(())
}
