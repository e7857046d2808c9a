//! Oxidized-Sync - producer/consumer demonstration
//!
//! Runs a bounded pipeline built on the `ox-sync` primitives.
//!
//! Usage: `oxidized-sync [CONFIG]`. Without an argument the config is read
//! from the platform config directory, falling back to defaults.

mod pipeline;

use anyhow::{bail, Context, Result};
use ox_core::config::Config;

fn main() -> Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => Config::load().unwrap_or_default(),
    };

    ox_core::logging::init(&config);

    tracing::info!("Starting Oxidized-Sync pipeline");

    let report = pipeline::run(&config.pipeline)?;
    tracing::info!(
        "Produced {}, consumed {}, checksum {:#x}",
        report.produced,
        report.consumed,
        report.checksum
    );

    if !report.is_consistent() {
        bail!(
            "pipeline lost items: expected checksum {:#x}, got {:#x}",
            report.expected_checksum,
            report.checksum
        );
    }

    Ok(())
}
