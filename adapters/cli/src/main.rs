#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs the Raid Helper engine against a simulated
//! host.

mod config;
mod sim;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use raid_helper_core::Settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "raid-helper", version, about = "Raid encounter tracking with beacon recalls")]
struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the engine against a seeded simulated host.
    Run {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of simulation steps to run.
        #[arg(long, default_value_t = 2_000)]
        steps: u64,
        /// Seed for the simulated host.
        #[arg(long, default_value_t = 0x5eed)]
        seed: u64,
    },
    /// Print the effective configuration as TOML.
    PrintConfig {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Entry point for the Raid Helper command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            steps,
            seed,
        } => {
            let settings = settings(config)?;
            info!(steps, seed, zones = settings.zones.len(), "starting simulation");
            let summary = sim::Simulation::new(settings, seed).run(steps);
            println!("{summary}");
        }
        Command::PrintConfig { config } => {
            let settings = settings(config)?;
            let rendered =
                toml::to_string_pretty(&settings).context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}

fn settings(path: Option<PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => config::load(path),
        None => Ok(config::default_settings()),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "raid_helper=debug"
    } else {
        "raid_helper=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
