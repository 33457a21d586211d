//! `cyper-gateway` - realtime gateway with continuous authorization and a
//! signed audit trail.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyper_config::Config;
use cyper_crypto::KeyPair;
use cyper_gateway::{Gateway, config_bridge};
use tracing::{info, warn};

/// Cyper gateway.
#[derive(Parser)]
#[command(name = "cyper-gateway")]
#[command(author, version, about = "Realtime gateway with continuous authorization")]
struct Cli {
    /// Log at debug level regardless of configuration.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway until interrupted.
    Serve {
        /// Config file. Defaults to `$CYPER_CONFIG` when set.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print a new audit signing key pair as environment assignments.
    Keygen,
    /// Print the effective configuration (private key omitted).
    Config {
        /// Config file. Defaults to `$CYPER_CONFIG` when set.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config.as_deref(), cli.verbose).await,
        Command::Keygen => {
            keygen();
            Ok(())
        },
        Command::Config { config } => show_config(config.as_deref()),
    }
}

async fn serve(path: Option<&Path>, verbose: bool) -> Result<()> {
    let config = Config::load(path).context("failed to load configuration")?;

    let mut log_config = config_bridge::log_config(&config.logging)?;
    if verbose {
        log_config.level = "debug".to_owned();
    }
    if let Err(e) = cyper_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let gateway = Gateway::build(config).context("failed to start gateway")?;
    let listener = gateway.bind().await.context("failed to bind listener")?;
    info!(addr = %listener.local_addr()?, "cyper-gateway listening");

    let signal = {
        let cancel = gateway.shutdown_token();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        cancel.cancel();
                    },
                    Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C"),
                },
                () = cancel.cancelled() => {},
            }
        })
    };

    gateway.run(listener).await?;
    signal.abort();
    Ok(())
}

fn keygen() {
    let keypair = KeyPair::generate();
    println!("# audit signing key {}", keypair.key_id());
    println!(
        "AUDIT_SIGNING_PRIVATE_KEY={}",
        keypair.secret_base64().as_str()
    );
    println!(
        "AUDIT_SIGNING_PUBLIC_KEY={}",
        keypair.public_key().to_base64()
    );
}

fn show_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load(path).context("failed to load configuration")?;
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
