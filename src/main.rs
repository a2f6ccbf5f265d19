// src/main.rs

//! The main entry point for the Millrace server binary.

use anyhow::Result;
use millrace::db::DbOptions;
use millrace::logging::LogBridge;
use millrace::server::{self, Hooks, ServerOptions};
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("Millrace version {VERSION}");
        return Ok(());
    }

    let flag = |name: &str| {
        args.iter()
            .position(|arg| arg == name)
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
    };

    let db_path = flag("--db").unwrap_or("millrace.db").to_string();
    let identity_path = flag("--identity").unwrap_or("millrace.key").to_string();

    let port_override = match flag("--port") {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                eprintln!("Invalid port number: {raw}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    // Setup logging with reloading capabilities. The database bridge is
    // registered up front and wired to its channel once the config is read.
    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    let bridge = LogBridge::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .with(bridge.clone())
        .init();

    // Store the handle in an Arc so reloads can adjust the log level.
    let reload_handle = Arc::new(reload_handle);

    let options = ServerOptions {
        db: DbOptions {
            path: db_path,
            ..DbOptions::default()
        },
        identity_path,
        port_override,
    };

    if let Err(e) = server::run(options, Hooks::default(), bridge, reload_handle).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
