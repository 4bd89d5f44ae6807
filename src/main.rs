//! framedex CLI
//!
//! Inspect, validate, and sample deterministic frame-indexed H.265
//! files.
//!
//! # Usage
//!
//! ```bash
//! framedex info --input flies.mp4 --json
//! framedex verify --input flies.mp4
//! framedex grab --input flies.mp4 -n 250 --output frame250.png
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use framedex::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => {
            info!("Executing info command");
            commands::info(args)?;
        }
        Commands::Verify(args) => {
            info!("Executing verify command");
            commands::verify(args)?;
        }
        Commands::Grab(args) => {
            info!("Executing grab command");
            commands::grab(args)?;
        }
        Commands::Import(args) => {
            info!("Executing import command");
            commands::import(args)?;
        }
    }

    Ok(())
}
