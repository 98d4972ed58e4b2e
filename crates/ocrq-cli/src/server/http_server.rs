//! HTTP server startup and lifecycle management.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;

use super::error::{Result, ServerError};
use super::shutdown_signal;
use crate::config::ServerConfig;
use crate::{TRACING_TARGET_SHUTDOWN, TRACING_TARGET_STARTUP};

/// Binds the configured address and serves `app` until a shutdown signal.
///
/// In-flight requests get up to the configured shutdown timeout to finish
/// once the signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the address cannot be
/// bound, or the server fails while running.
pub async fn serve_http(app: Router, server_config: ServerConfig) -> Result<()> {
    server_config
        .validate()
        .map_err(|err| ServerError::invalid_config(&err))?;

    let server_addr = server_config.server_addr();
    let listener = TcpListener::bind(server_addr).await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_STARTUP,
            addr = %server_addr,
            error = %err,
            "Failed to bind to address"
        );
        ServerError::BindError {
            address: server_addr.to_string(),
            source: err,
        }
    })?;

    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        addr = %server_addr,
        "Server is ready and listening for connections"
    );

    if server_config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_STARTUP,
            "Server is bound to all interfaces. Ensure firewall rules are properly configured."
        );
    }

    let start_time = Instant::now();
    let shutdown_timeout = server_config.shutdown_timeout();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    let result = tokio::select! {
        result = server => result,
        () = drain_deadline(shutdown_timeout) => {
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                timeout_secs = shutdown_timeout.as_secs(),
                "Shutdown timeout elapsed, dropping in-flight requests"
            );
            Ok(())
        }
    };

    result.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %err,
            "Server encountered an error"
        );
        ServerError::Runtime(err)
    })?;

    tracing::info!(
        target: TRACING_TARGET_SHUTDOWN,
        uptime_secs = start_time.elapsed().as_secs(),
        "Server shut down gracefully"
    );
    Ok(())
}

/// Resolves `timeout` after the shutdown signal; every signal listener is woken.
async fn drain_deadline(timeout: std::time::Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}
