// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vulcan server (vulcand)
//!
//! Workload-execution control plane: accepts code submissions over HTTP,
//! routes them to an isolation backend, streams logs while they run, and
//! persists durable records.

use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use vulcan_broker::LogBroker;
use vulcan_engine::Engine;
use vulcan_server::{build_registry, router, AppState, Config};
use vulcan_storage::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("vulcand {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("vulcand {}", env!("CARGO_PKG_VERSION"));
                println!("Vulcan workload-execution control plane");
                println!();
                println!("USAGE:");
                println!("    vulcand");
                println!();
                println!("Configuration comes from the environment:");
                println!("    VULCAN_LISTEN_ADDR   HTTP bind address (default :8080)");
                println!("    VULCAN_DB_PATH       store backing file, :memory: for ephemeral (default vulcan.db)");
                println!("    VULCAN_LOG_LEVEL     debug|info|warn|error (default info)");
                println!("    VULCAN_NODE_ID       node identifier stamped on workloads (default node-0)");
                println!("    VULCAN_WORK_ROOT     staging directory for backend work dirs");
                println!("    VULCAN_MICROVM_BIN / VULCAN_MICROVM_KERNEL / VULCAN_MICROVM_ROOTFS");
                println!("                         enable the microVM backend");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: vulcand [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    setup_logging(&config);

    info!("starting vulcand");

    let store = if config.db_path == ":memory:" {
        Arc::new(Store::in_memory())
    } else {
        Arc::new(Store::open(Path::new(&config.db_path))?)
    };
    let broker = Arc::new(LogBroker::new());
    let registry = Arc::new(build_registry(&config));
    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&broker),
        Arc::clone(&registry),
        config.node_id.clone(),
    );

    let state = AppState {
        engine,
        store: Arc::clone(&store),
        broker,
        registry,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final durability point before exit.
    store.sync()?;
    info!("vulcand stopped");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("signal handler setup failed: {e}");
            return std::future::pending().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("signal handler setup failed: {e}");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}

fn setup_logging(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
