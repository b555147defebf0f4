mod adaptive;
mod config;
mod domain;
mod monitor;
mod resilience;
mod risk;
mod signal;
mod sizing;
mod storage;
mod trader;
mod venue;

use config::Config;
use std::env;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};
use trader::Trader;

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn has_flag(flag: &str) -> bool {
    env::args().skip(1).any(|arg| arg == flag)
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let trader = match Trader::from_config(config).await {
        Ok(trader) => Arc::new(trader),
        Err(e) => {
            error!(error = %e, "Failed to create trader");
            return;
        }
    };

    info!(config = %config_path, "Trader initialized");

    if has_flag("--reset-threshold") {
        let threshold = trader.reset_threshold().await;
        info!(threshold = threshold, "Starting from the base threshold");
    }

    let runner = Arc::clone(&trader);
    let handle = tokio::spawn(async move { runner.start().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    if trader.is_running().await {
        if let Err(e) = trader.stop().await {
            error!(error = %e, "Failed to stop trader");
        }
    }

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Trader error"),
        Err(e) => error!(error = %e, "Trader task failed"),
    }

    trader.close().await;
}
