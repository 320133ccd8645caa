use std::process;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use fleetconf::cli::{execute, Cli};
use fleetconf::settings::{default_settings_path, load_settings_from};

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = match load_settings_from(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings {}: {}", settings_path.display(), e);
            process::exit(1);
        }
    };
    debug!("Using settings from {}", settings_path.display());

    match execute(&cli, &settings) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
