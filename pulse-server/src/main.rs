//! # Pulse Server
//!
//! Real-time quote distribution hub.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! pulse-server
//!
//! # Run with custom configuration file
//! pulse-server --config /path/to/config.yaml
//!
//! # Run with environment variable overrides
//! PULSE_SERVER_PORT=9090 PULSE_JWT_SECRET=... pulse-server
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use clap::Parser;
use pulse_core::config::Validatable;
use std::path::PathBuf;
use tracing::{error, info};

use pulse_server::{PulseServer, ServerConfig};

/// Pulse hub server
#[derive(Parser, Debug)]
#[command(name = "pulse-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override server host
    #[arg(long, env = "PULSE_SERVER_HOST")]
    host: Option<String>,

    /// Override server port
    #[arg(long, env = "PULSE_SERVER_PORT")]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return;
    }

    match run_server(config).await {
        Ok(()) => info!("Pulse server stopped"),
        Err(e) => {
            error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Loads configuration from file and applies overrides.
fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        PulseServer::load_config(&args.config)?
    } else {
        eprintln!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );
        let mut config = ServerConfig::default();
        config.apply_env_overrides();
        config
    };

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Creates and runs the server.
async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = PulseServer::new(config);
    server.initialize().await?;
    server.run().await?;
    Ok(())
}
