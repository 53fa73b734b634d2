//! Lockstep - Smart lock provisioning and lifecycle tool
//!
//! Resolves scanned codes, provisions network-capable locks with the cloud
//! registry and runs the delete and factory-reset workflows against the
//! configured cloud and local record store.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "lockstep")]
#[command(about = "Smart lock provisioning and lifecycle tool", version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "lockstep.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Client token to use instead of a fresh one per invocation
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report the capability of a model identifier
    Classify {
        model: String,
    },
    /// Describe a device from a scanned code or a stored identifier
    Resolve {
        /// Raw scanned code content
        #[arg(long, conflicts_with = "id", required_unless_present = "id")]
        code: Option<String>,
        /// Device identifier of a stored record
        #[arg(long)]
        id: Option<String>,
    },
    /// Open a session from a scanned code, provisioning network locks with the cloud
    Add {
        /// Raw scanned code content
        code: String,
    },
    /// List stored connection records
    Records,
    /// List devices registered with the cloud
    Devices,
    /// Delete a device everywhere it is known
    Delete {
        identifier: String,
    },
    /// Factory reset a device and remove it
    FactoryReset {
        identifier: String,
        /// Current admin code
        #[arg(long)]
        admin_code: String,
    },
    /// Write a sample configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Lockstep v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig = args.command {
        config::save_default_config(&args.config)?;
        println!("Wrote sample configuration to {}", args.config.display());
        return Ok(());
    }

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Classify { model } => commands::classify(&config, &model),
        Command::Resolve { code, id } => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.resolve(code.as_deref(), id.as_deref()).await
        }
        Command::Add { code } => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.add(&code).await
        }
        Command::Records => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.records().await
        }
        Command::Devices => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.devices().await
        }
        Command::Delete { identifier } => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.delete(&identifier).await
        }
        Command::FactoryReset { identifier, admin_code } => {
            let app = commands::App::build(&config, args.token.as_deref())?;
            app.factory_reset(&identifier, &admin_code).await
        }
        Command::InitConfig => Ok(()),
    }
}
