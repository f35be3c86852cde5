use clap::Parser;
use std::process::ExitCode;
use tokio::sync::watch;
use tradespike::cli::{exit_code, Cli};
use tradespike::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Defaults, optional TOML file, .env, then the environment
    let config = match Config::load_layered(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    // Initialize telemetry
    let _telemetry = match tradespike::telemetry::init_telemetry(&config.telemetry) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {e}");
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    match cli.command.execute(&config, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::from(exit_code(&e))
        }
    }
}
