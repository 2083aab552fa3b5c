#![doc = include_str!("../README.md")]

use anyhow::bail;
use cdrgen::service::batch::run_batch;
use cdrgen::service::broker::rabbit::RabbitBroker;
use cdrgen::service::config::{CliArgs, Config};
use cdrgen::service::dispatcher::{Dispatcher, run_daemon};
use cdrgen::service::pool::TaskPool;
use cdrgen::service::router::Router;
use cdrgen::service::telemetry::init_telemetry;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use udr::JsonCodec;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Config::try_from(args)?;

    let providers = init_telemetry(&config.log)?;
    log_startup_info(&config);

    let result = run(&config).await;
    if let Err(e) = &result {
        tracing::error!("cdrgen stopped: {e:#}");
    }

    providers.shutdown();
    result
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let broker = RabbitBroker::connect(&config.broker).await?;
    let udr_queue = broker.declare_queue(&config.udr_queue).await?;

    let pool = TaskPool::new(
        config.limits.max_inflight_tasks,
        Arc::new(broker.publisher(&udr_queue)),
        Arc::new(JsonCodec),
    );
    let dispatcher = Dispatcher::new(Router::standard(), pool, config.limits);

    let served = if config.daemon {
        serve(&broker, &dispatcher, config).await
    } else {
        one_shot(&dispatcher).await
    };

    if let Err(e) = broker.close().await {
        tracing::warn!("{e}");
    }
    served
}

async fn serve(
    broker: &RabbitBroker,
    dispatcher: &Dispatcher,
    config: &Config,
) -> anyhow::Result<()> {
    let request_queue = broker.declare_queue(&config.request_queue).await?;
    let deliveries = broker.consume(&request_queue).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    run_daemon(dispatcher, deliveries, shutdown).await?;
    tracing::info!("Daemon stopped");
    Ok(())
}

async fn one_shot(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let tally = run_batch(dispatcher).await?;
    if !tally.is_success() {
        bail!(
            "failed to publish the record ({} failed, {} missing)",
            tally.failed,
            tally.missing
        );
    }
    Ok(())
}

fn log_startup_info(config: &Config) {
    let mode = if config.daemon { "daemon" } else { "batch" };
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting cdrgen in {mode} mode with full config: {config:#?}"
        );
    } else {
        tracing::info!(
            "Starting cdrgen in {mode} mode, publishing to `{}` with {} task permits",
            config.udr_queue,
            config.limits.max_inflight_tasks
        );
    }
    if let Some(file) = &config.log.file {
        tracing::info!(
            "Also logging to {}/{}.<date>",
            file.dir.display(),
            file.name
        );
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
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
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    shutdown.cancel();
}
