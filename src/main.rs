use std::{env, process::ExitCode};

use tracing_subscriber::EnvFilter;
use yearcal::storage::config::Config;
use yearcal::sync::{google_api::ApiError, sync_engine::SyncError};

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    let options = match cli::parse_cli(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = cli::run(options).await {
        eprintln!("Error: {:#}", e);
        tracing::error!("yearcal failed: {:#}", e);

        if let Some(SyncError::ApiError(ApiError::Unauthorized)) = e.downcast_ref::<SyncError>() {
            eprintln!("Your access token was rejected. Obtain a new one and pass it with --token or {}.", cli::TOKEN_ENV);
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn setup_logging() {
    let log_dir = Config::config_dir();

    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "yearcal.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    std::mem::forget(_guard);

    tracing::info!("yearcal started");
}
