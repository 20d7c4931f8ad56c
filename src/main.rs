//! Bazaar Server: session authentication and real-time delivery
//!
//! Main entry point that wires all crates together and starts the server.

use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use bazaar_api::{AppState, Stores, build_app};
use bazaar_core::config::AppConfig;
use bazaar_database::DatabasePool;
use bazaar_database::migration::run_migrations;

#[tokio::main]
async fn main() {
    let env = std::env::var("BAZAAR_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match config.validate() {
        Ok(findings) => {
            for finding in findings {
                tracing::warn!(environment = %config.environment, "Insecure configuration: {finding}");
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        environment = %config.environment,
        "Starting Bazaar v{}",
        env!("CARGO_PKG_VERSION")
    );

    // ── Step 1: Stores ───────────────────────────────────────────
    let (stores, db) = if config.database.uses_memory() {
        tracing::warn!("Using in-memory stores; all state is lost on exit");
        (Stores::memory(), None)
    } else {
        let db = DatabasePool::connect(&config.database)
            .await
            .context("Database connection failed")?;
        run_migrations(db.pool())
            .await
            .context("Migration failed")?;
        (Stores::postgres(&db), Some(db))
    };

    // ── Step 2: Services and connection hub ──────────────────────
    let shutdown = CancellationToken::new();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let addr = config.server.bind_address();
    let (state, hub_task) =
        AppState::build(config, stores, shutdown.clone()).context("Service wiring failed")?;
    let dispatcher = state.dispatcher.clone();

    // ── Step 3: HTTP server ──────────────────────────────────────
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Bazaar server listening on {addr}");

    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    // ── Step 4: Wait for a signal, then drain ────────────────────
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
        result = &mut server => {
            shutdown.cancel();
            result.context("Server task panicked")?.context("Server error")?;
            return Ok(());
        }
    }
    shutdown.cancel();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result.context("Server task panicked")?.context("Server error")?,
        Err(_) => {
            tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace elapsed; aborting");
            server.abort();
        }
    }
    if tokio::time::timeout(grace, dispatcher.drain()).await.is_err() {
        tracing::warn!("Push forwards still running at exit");
    }
    if tokio::time::timeout(grace, hub_task).await.is_err() {
        tracing::warn!("Connection hub did not stop in time");
    }
    if let Some(db) = db {
        db.close().await;
    }

    tracing::info!("Bazaar server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
