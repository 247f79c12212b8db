use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_drive_runtime::config::DriveConfig;

/// 50 Hz swerve drive runtime
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Robot configuration (JSON). Missing fields use the built-in robot constants.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Echo setpoints back as feedback instead of talking to hardware
    #[arg(long)]
    loopback: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            DriveConfig::load(path)
        }
        None => {
            let config = DriveConfig::default();
            config.validate().map(|_| config)
        }
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if args.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize config: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = swerve_drive_runtime::runtime::run(config, args.loopback).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
