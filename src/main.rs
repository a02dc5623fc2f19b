//! Broker host binary
//!
//! Loads the configuration, provisions the builtin handlers, starts them
//! against the broker and runs until SIGINT or SIGTERM.

use broker_host::error::error_chain;
use broker_host::observability::init_default_logging;
use broker_host::{App, AppConfig, Credentials, HandlerRegistry, MqttConnector};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tracing::{error, info};

/// Default configuration locations, tried in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["broker-host.toml", "config/broker-host.toml"];

/// Runs pub/sub handlers against a broker connection
#[derive(Parser)]
#[command(name = "broker-host")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BROKER_HOST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the configured handlers until interrupted
    Run,
    /// Validate the configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        process::exit(1);
    }
}

fn load_configuration(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                format!(
                    "no configuration file found; pass -c/--config or create one of {}",
                    DEFAULT_CONFIG_PATHS.join(", ")
                )
            })?,
    };

    info!(path = %path.display(), "loading configuration");
    Ok(AppConfig::load_from_file(&path)?)
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = env!("CARGO_PKG_VERSION"), "broker host starting");

    let connector = MqttConnector::new(config.context_store(), config.connection.clone());
    let mut app = App::new(connector);

    if let Err(e) = app
        .provision(&config, &HandlerRegistry::with_builtins())
        .await
    {
        return Err(error_chain(&e).into());
    }

    if let Err(e) = app.start(&Credentials::from_env()).await {
        let start_error = error_chain(&e);
        // Release whatever the failed start left behind
        if let Err(stop_error) = app.stop().await {
            error!(error = %error_chain(&stop_error), "stop after failed start also failed");
        }
        return Err(start_error.into());
    }

    wait_for_shutdown_signal().await?;

    info!("shutdown requested");
    app.stop().await.map_err(|e| error_chain(&e))?;
    info!("broker host stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM");
        }
    }
    Ok(())
}

fn handle_config_command(config: &AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = HandlerRegistry::with_builtins();
    for (index, handler) in config.handlers.iter().enumerate() {
        registry
            .build(handler)
            .map_err(|e| format!("handle[{index}] ({}): {e}", handler.handler))?;
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(handlers = config.handlers.len(), "configuration is valid");
    Ok(())
}
