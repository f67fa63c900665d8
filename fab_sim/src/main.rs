//! # Fab Sim Binary
//!
//! Runs simulated equipment with the register monitor attached and serves
//! decoded snapshots on the viewer socket.
//!
//! # Usage
//!
//! ```bash
//! # Run every instance in a config file
//! fab_sim --config config/fab_sim.toml
//!
//! # Quick start with one built-in layout
//! fab_sim --layout gas_cabinet/v2 -v
//!
//! # Latch an emergency stop on every instance after 10 seconds
//! fab_sim --config config/fab_sim.toml --emergency-stop-after 10
//!
//! # Watch the stream
//! socat - UNIX-CONNECT:/tmp/fab_state.sock
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use fab_common::config::{ConfigError, ConfigLoader, LogLevel};
use fab_common::consts::DEFAULT_CONFIG_PATH;
use fab_common::layout::{LayoutError, builtin_layout, builtin_layout_ids};
use fab_sim::{SimConfig, SimRuntime};
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Fab Sim - simulated gas cabinets and stockers with a live register monitor
#[derive(Parser, Debug)]
#[command(name = "fab_sim")]
#[command(version)]
#[command(about = "Simulated fab equipment with register decoding and a live viewer socket")]
#[command(long_about = None)]
struct Args {
    /// Path to the simulator configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single instance of a built-in layout instead of a config file.
    #[arg(short, long, value_name = "ID", conflicts_with = "config")]
    layout: Option<String>,

    /// Print the built-in layouts and exit
    #[arg(long)]
    list_layouts: bool,

    /// Latch an emergency stop on every instance after this many seconds
    #[arg(long, value_name = "SECS")]
    emergency_stop_after: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("fab_sim failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Tracing goes up before anything can fail so every error is logged.
    let loaded = (!args.list_layouts).then(|| load_config(&args));
    let configured = loaded
        .as_ref()
        .and_then(|(config, _)| config.as_ref().ok())
        .map(|c| c.shared.log_level);
    setup_tracing(&args, configured);

    let Some((config, config_dir)) = loaded else {
        for line in layout_listing()? {
            println!("{line}");
        }
        return Ok(());
    };
    let config = config?;

    info!(
        "Fab Sim v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );
    let runtime = SimRuntime::build(&config, &config_dir)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Received shutdown signal (Ctrl+C)"),
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    runtime
        .run(
            shutdown_rx,
            args.emergency_stop_after.map(Duration::from_secs),
        )
        .await?;

    info!("🏁 Fab Sim shutdown complete");
    Ok(())
}

/// Config from `--layout`, `--config` or the default path, with the
/// directory relative layout paths resolve against.
fn load_config(args: &Args) -> (Result<SimConfig, ConfigError>, PathBuf) {
    match (&args.layout, &args.config) {
        (Some(id), _) => (Ok(SimConfig::single(id)), PathBuf::from(".")),
        (None, path) => {
            let path = path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (SimConfig::load(&path), dir)
        }
    }
}

/// One line per built-in layout: id, field count, word count, description.
fn layout_listing() -> Result<Vec<String>, LayoutError> {
    builtin_layout_ids()
        .map(|id| -> Result<String, LayoutError> {
            let layout = builtin_layout(id)?;
            Ok(format!(
                "{id:<16} {:>3} fields {:>4} words  {}",
                layout.len(),
                layout.required_len(),
                layout.description()
            ))
        })
        .collect()
}

/// Setup tracing subscriber from CLI flags, falling back to the config
/// file's level.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured.unwrap_or_default()
    };

    let directive: Directive = level
        .as_directive()
        .parse()
        .unwrap_or_else(|_| Level::INFO.into());
    let filter = EnvFilter::from_default_env().add_directive(directive);

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_covers_every_builtin_layout() {
        let lines = layout_listing().unwrap();
        assert_eq!(lines.len(), builtin_layout_ids().count());
        assert!(lines.iter().any(|l| l.starts_with("gas_cabinet/v2")));
    }

    #[test]
    fn layout_and_config_conflict() {
        let err =
            Args::try_parse_from(["fab_sim", "--layout", "stocker/v1", "--config", "x.toml"])
                .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn single_layout_needs_no_config_file() {
        let args = Args::try_parse_from(["fab_sim", "--layout", "stocker/v1"]).unwrap();
        let (config, dir) = load_config(&args);
        assert_eq!(config.unwrap().equipment.len(), 1);
        assert_eq!(dir, PathBuf::from("."));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args =
            Args::try_parse_from(["fab_sim", "--config", "/nonexistent/fab.toml"]).unwrap();
        let (config, dir) = load_config(&args);
        assert!(config.is_err());
        assert_eq!(dir, PathBuf::from("/nonexistent"));
    }
}
