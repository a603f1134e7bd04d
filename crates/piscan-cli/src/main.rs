//! # piscan
//!
//! Operator console for the PiScan ticket validator.
//!
//! This binary provides:
//! - An interactive scan loop fed by a line-oriented code source
//! - Validation history, aggregate stats and a connection probe
//! - Configuration bootstrap
//!
//! ## Running
//!
//! ```bash
//! # Scan from a keyboard-wedge reader or by typing codes
//! piscan scan
//!
//! # Production logging (JSON files under the data directory)
//! piscan --production scan --auto-reset
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use piscan_core::{
    default_config_path, BackendClient, ScanController, ScanOutcome, ScannerConfig,
    TimeNormalizer,
};
use tokio::io::BufReader;
use tracing::{debug, info};

mod camera;
mod cli;
mod logging;
mod render;

use camera::CameraInput;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    logging::init(cli.production, cli.log_level.as_deref())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting piscan");

    if let Command::Config { init: true, force } = cli.command {
        return init_config(cli.config.as_deref(), force);
    }

    let config = ScannerConfig::load(cli.config.as_deref())
        .map_err(piscan_core::PiscanError::from)
        .context("failed to load configuration")?;
    debug!(base_url = %config.backend.base_url, "configuration loaded");

    let times = TimeNormalizer::new(config.display.zone());
    let client = BackendClient::from_config(&config)?;

    match cli.command {
        Command::Scan { auto_reset } => scan(&config, client, times, auto_reset).await,
        Command::History { limit } => {
            let limit = limit.unwrap_or(config.display.history_limit);
            let items = client.history(limit, &times).await?;
            println!("{}", render::history_table(&items));
            Ok(())
        }
        Command::Stats => {
            let stats = client.stats().await?;
            println!("{}", render::stats_summary(&stats));
            Ok(())
        }
        Command::Health => {
            let status = client.health().await;
            println!("{}", render::health_line(&config.backend.base_url, status));
            Ok(())
        }
        Command::Config { .. } => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn scan(
    config: &ScannerConfig,
    client: BackendClient,
    times: TimeNormalizer,
    auto_reset: bool,
) -> anyhow::Result<()> {
    let controller = ScanController::new(client, times, config.scanner.guard_cooldown());

    // A console always has its input device; camera permission is implicit.
    if let Err(err) = controller.start(true).await {
        bail!(err.user_message());
    }

    let mut inputs = camera::spawn_reader(
        BufReader::new(tokio::io::stdin()),
        controller.subscribe(),
    );

    prompt("Ready to scan");
    while let Some(input) = inputs.recv().await {
        match input {
            CameraInput::Frame(event) => match controller.handle_scan(&event).await {
                ScanOutcome::Resulted(result) => {
                    let state = controller.snapshot().await;
                    println!("{}", render::result_card(&result, state.result_time.as_ref()));
                    println!("{}", render::counters(&state));
                    if auto_reset {
                        controller.reset().await;
                        prompt("Ready to scan");
                    }
                }
                ScanOutcome::Ignored(reason) => {
                    debug!(reason = reason.as_str(), "frame ignored");
                }
            },
            CameraInput::Reset => {
                if controller.reset().await {
                    prompt("Ready to scan");
                }
            }
            CameraInput::Quit => break,
        }
    }

    let state = controller.snapshot().await;
    info!(
        scans = state.scan_count,
        valid = state.success_count,
        "scan session ended"
    );
    println!("{}", render::counters(&state));
    Ok(())
}

fn prompt(message: &str) {
    println!("{message}");
    let _ = std::io::stdout().flush();
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path: PathBuf = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().context("no default configuration directory")?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    ScannerConfig::default()
        .save(&path)
        .map_err(piscan_core::PiscanError::from)?;
    info!(path = %path.display(), "configuration written");
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piscan").join("config.toml");

        init_config(Some(&path), false).unwrap();
        let loaded = ScannerConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.backend, ScannerConfig::default().backend);

        assert!(init_config(Some(&path), false).is_err());
        init_config(Some(&path), true).unwrap();
    }
}
