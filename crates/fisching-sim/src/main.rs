//! # Fisching Sim
//!
//! Headless driver for the Fisching encounter schedulers.
//!
//! Loads a scheduler config and an encounter catalog, runs both background
//! loops in real time while simulating catches, and prints what the HUD
//! would show.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod sim;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sim::SimArgs;

/// Main entry point.
fn main() -> Result<()> {
    let args = SimArgs::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("fisching=info".parse()?))
        .init();

    info!("Fisching sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    sim::run(&args)?;

    info!("Fisching sim shutdown complete");
    Ok(())
}
