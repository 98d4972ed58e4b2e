#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use ocrq_nats::NatsClient;
use ocrq_proxy::{OcrProxy, routes};
use ocrq_worker::{OcrWorker, WorkerState};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, Command, ProxyArgs, WorkerArgs, create_engine_loader};
use crate::server::RouterMiddlewareExt;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "ocrq_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "ocrq_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "ocrq_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = format!("{error:#}"),
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "starting ocrq"
    );

    cli.log();
    cli.validate()?;

    match cli.command {
        Command::Proxy(args) => run_proxy(args).await,
        Command::Worker(args) => run_worker(args).await,
    }
}

/// Serves the HTTP API until a shutdown signal.
async fn run_proxy(args: ProxyArgs) -> anyhow::Result<()> {
    let nats = NatsClient::connect(args.nats)
        .await
        .context("failed to connect to NATS")?;
    let queue = nats
        .job_queue(&args.proxy.queue)
        .await
        .context("failed to open the job queue")?;

    let proxy = OcrProxy::new(Arc::new(queue), args.proxy);
    let router = routes(proxy).with_middleware(&args.server);

    if let Err(err) = server::serve_http(router, args.server).await {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %err,
            recoverable = err.is_recoverable(),
            "HTTP server stopped"
        );
        return Err(err.into());
    }
    Ok(())
}

/// Runs the job consumer until a shutdown signal, then lets the current job
/// finish within the shutdown timeout.
async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let loader = create_engine_loader(&args).context("failed to select a recognition engine")?;
    let state = WorkerState::from_config(&args.worker, loader)
        .await
        .context("failed to create worker state")?;

    let cancel_token = CancellationToken::new();
    let mut handle = OcrWorker::connect(state, cancel_token.clone())
        .await
        .context("failed to bind to the job queue")?
        .spawn();

    tokio::select! {
        joined = &mut handle => return worker_exit(joined),
        () = server::shutdown_signal() => {}
    }

    cancel_token.cancel();
    let shutdown_timeout = args.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, handle).await {
        Ok(joined) => worker_exit(joined),
        Err(_) => {
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                timeout_secs = shutdown_timeout.as_secs(),
                "Worker did not stop in time, abandoning the running job"
            );
            Ok(())
        }
    }
}

fn worker_exit(joined: Result<ocrq_worker::Result<()>, JoinError>) -> anyhow::Result<()> {
    joined
        .context("worker task panicked")?
        .context("worker stopped with an error")
}
