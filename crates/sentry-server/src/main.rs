//! Sentry binary

use clap::{Parser, Subcommand};
use sentry_server::{Config, SentryServer};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sentry", version, about = "Notify APRS node operators when their node goes quiet")]
struct Cli {
    /// Configuration file; searched in the standard locations when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server (default)
    Serve,

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a sample configuration
    Create {
        #[arg(default_value = "sentry.yaml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Config {
            action: ConfigAction::Create { path },
        } => {
            Config::write_sample(&path)?;
            println!("Wrote sample configuration to {}", path.display());
            Ok(())
        }
        Command::Serve => serve(cli.config).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    // Tracing is not up yet, so configuration errors go to stderr
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let err = common::Error::config(e);
            eprintln!("{}", err);
            return Err(err.into());
        }
    };

    common::logging::init_with_format(
        config.logging.format.as_deref(),
        config.logging.level.as_deref().unwrap_or("info"),
    );
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Sentry starting");

    let server_config = config.to_server_config().map_err(common::Error::config)?;
    let server = SentryServer::new(server_config).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    server.run().await?;
    Ok(())
}
