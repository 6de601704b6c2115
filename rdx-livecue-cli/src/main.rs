//! # livecue
//!
//! Fires match cues from a configuration file.
//!
//! ```bash
//! # Follow the real competition clock
//! livecue cues.json
//!
//! # Rehearse against a simulated competition starting now
//! livecue cues.json --test-mode
//!
//! # Send the abort sequence once and exit
//! livecue cues.json --test-abort
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use livecue::config::{LiveConfig, RunnerConfig};
use livecue::dispatch::{DeviceConfig, OscDispatcher};
use livecue::engine::CueEngine;
use livecue::simulation::{spawn_server, SimConfig};
use livecue::time_source::TimeSourceKind;
use livecue::{ENGINE_NAME, VERSION as LIB_VERSION};
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Port the simulated competition listens on in test mode.
const TEST_SERVER_PORT: u16 = 8008;

/// Fire timed device cues in step with a live match.
#[derive(Parser, Debug)]
#[command(name = "livecue")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Don't connect to the timing API. Simulate a set of matches starting now
    #[arg(long, conflicts_with = "test_abort")]
    test_mode: bool,

    /// Run all actions listed under the "abort_actions" key of the config and exit
    #[arg(long)]
    test_abort: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize structured logging.
    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    // 2. Load and validate the configuration before touching the network.
    let config = LiveConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let devices = config.devices.clone();
    let runner = config.into_runner()?;

    print_banner(&devices, &runner);

    // 3. Connect to the devices.
    let dispatcher = OscDispatcher::connect(&devices)
        .await
        .context("Failed to set up OSC devices")?;
    let dispatcher = Arc::new(dispatcher);

    // 4. Run in the requested mode.
    if cli.test_abort {
        CueEngine::from_config(runner, dispatcher)?.run_abort();
    } else if cli.test_mode {
        run_test_match(runner, dispatcher).await?;
    } else {
        CueEngine::from_config(runner, dispatcher)?.run().await?;
    }

    info!("Exiting");
    Ok(())
}

/// Runs the schedule against a simulated competition on localhost.
async fn run_test_match(runner: RunnerConfig, dispatcher: Arc<OscDispatcher>) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, TEST_SERVER_PORT));
    let (addr, server) = spawn_server(addr, SimConfig::starting_in(Duration::ZERO))
        .await
        .with_context(|| format!("Failed to start the simulated competition on {addr}"))?;

    let test_config = runner
        .with_endpoint(format!("http://{addr}/current"))
        .with_time_source(TimeSourceKind::Srcomp);
    let result = CueEngine::from_config(test_config, dispatcher)?.run().await;

    server.abort();
    Ok(result?)
}

/// Prints the startup summary, unless `QUIET_MODE` is set.
fn print_banner(devices: &[DeviceConfig], runner: &RunnerConfig) {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }

    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!(
        "{}   cli v{:<8} library v{:<8}",
        ENGINE_NAME.cyan().bold(),
        CLI_VERSION,
        LIB_VERSION
    );
    println!("{}", rule.dimmed());

    println!("{} {}", "Timing API:".yellow(), runner.endpoint());
    println!("{}", "Devices:".yellow());
    for device in devices {
        println!("  {:<16} {}", device.name.bold(), device.address);
    }

    let schedule = runner.schedule();
    println!(
        "{} {} cues, last at {:.1}s; {} abort actions",
        "Schedule:".yellow(),
        schedule.len(),
        schedule.final_time().unwrap_or(0.0),
        runner.abort_actions().len()
    );
    for action in schedule {
        println!("  {:>8.1}s  {}", action.time, action.label().dimmed());
    }
    println!("{}", rule.dimmed());
}
