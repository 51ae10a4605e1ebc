//! # dndink
//!
//! Shows a Home Assistant do-not-disturb toggle on a Waveshare 7.5"
//! tri-colour e-paper panel. Wires the settings, session and display crates
//! together and maps failures to exit codes.

#![deny(unsafe_code)]

mod daemon;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dndink_session::SessionError;
use dndink_settings::SettingsError;

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;
/// Exit code for any other fatal error.
const EXIT_FAILURE: u8 = 1;

/// Do-not-disturb e-paper status display.
#[derive(Parser, Debug)]
#[command(name = "dndink", version, about = "Home Assistant DND status on a tri-colour e-paper panel")]
struct Cli {
    /// JSON settings file (falls back to `$DNDINK_CONFIG`).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `dndink_session=trace` (overrides settings;
    /// `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Fetch the current state, draw it once and exit.
    #[arg(long)]
    once: bool,
}

/// Map a fatal error to the process exit code.
fn exit_code(error: &anyhow::Error) -> u8 {
    let is_config = error.downcast_ref::<SettingsError>().is_some()
        || matches!(error.downcast_ref::<SessionError>(), Some(SessionError::Config(_)));
    if is_config { EXIT_CONFIG } else { EXIT_FAILURE }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match dndink_settings::load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            dndink_core::logging::init_subscriber(cli.log_level.as_deref().unwrap_or("info"));
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    dndink_core::logging::init_subscriber(level);

    let result = if cli.once {
        daemon::run_once(&settings).await
    } else {
        daemon::run(&settings).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "dndink failed");
            ExitCode::from(exit_code(&e))
        }
    }
}
