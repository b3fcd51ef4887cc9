#![doc = include_str!("../README.md")]

mod server;

use anyhow::{Context, bail};
use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::HubService;
use server::telemetry::init_telemetry;
use sortition::{IdAuthority, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let result = run(&config).await;
    if let Err(e) = &result {
        tracing::error!("Service stopped with error: {e:#}");
    }
    providers.shutdown();
    result
}

async fn run(config: &ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "could not create data directory {}",
            config.data_dir.display()
        )
    })?;

    let ids = IdAuthority::with_os_entropy(
        config.alphabet.clone(),
        config.id_length,
        config.entropy_pool_size,
    )
    .context("could not seed the entropy pool")?;
    let store = Arc::new(
        Store::open(config.db_path(), config.busy_timeout, Arc::new(ids))
            .await
            .context("could not open the store")?,
    );

    let service = HubService::new(Arc::clone(&store));
    let fatal = service.fatal_token();

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("could not bind {}", config.server_addr))?;
    log_startup_info(config, &store);

    axum::serve(listener, service.into_router())
        .with_graceful_shutdown(shutdown_signal(fatal.clone()))
        .await?;

    store.close().await;

    if fatal.is_cancelled() {
        bail!("entropy source failed; no further identifiers or selections are possible");
    }

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig, store: &Store) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting hub service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting hub service on {} (database {}, ids {})",
            config.server_addr,
            config.db_path().display(),
            store.ids().pattern()
        );
    }
}

async fn shutdown_signal(fatal: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
        () = fatal.cancelled() => {
            tracing::error!("Unrecoverable failure, refusing further requests");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
