//! Recovery, concurrency and tracing middleware for the proxy router.
//!
//! Every failure produced here is still answered with the uniform
//! `{"error": ...}` envelope and HTTP 200.

use std::any::Any;

use axum::error_handling::HandleErrorLayer;
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json, Router};
use ocrq_core::Answer;
use tower::ServiceBuilder;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

/// Tracing target for middleware failures.
const TRACING_TARGET_RECOVERY: &str = "ocrq_cli::server::recovery";

/// Extension trait layering the server middleware onto a [`Router`].
pub trait RouterMiddlewareExt {
    /// Layers, outermost first: request ids and tracing, error handling,
    /// panic recovery, request timeout and the global concurrency limit.
    fn with_middleware(self, config: &ServerConfig) -> Self;
}

impl RouterMiddlewareExt for Router {
    fn with_middleware(self, config: &ServerConfig) -> Self {
        let recovery = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_error))
            .layer(CatchPanicLayer::custom(catch_panic))
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(GlobalConcurrencyLimitLayer::new(
                config.max_concurrent_requests,
            ));

        let observability = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id());

        self.layer(recovery).layer(observability)
    }
}

async fn handle_error(err: BoxError) -> Response {
    let message = if err.is::<Elapsed>() {
        tracing::error!(
            target: TRACING_TARGET_RECOVERY,
            error = %err,
            "request timeout exceeded"
        );
        "request timeout".to_owned()
    } else {
        tracing::error!(
            target: TRACING_TARGET_RECOVERY,
            error = %err,
            "unknown middleware error"
        );
        format!("internal error: {err}")
    };

    Json(Answer::<()>::error(message)).into_response()
}

fn catch_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    tracing::error!(
        target: TRACING_TARGET_RECOVERY,
        panic = details,
        "handler panicked"
    );

    Json(Answer::<()>::error("internal error")).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;

    fn config(request_timeout: u64) -> ServerConfig {
        ServerConfig {
            request_timeout,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn passes_requests_through() -> anyhow::Result<()> {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .with_middleware(&config(5));
        let server = TestServer::new(app)?;

        let response = server.get("/ok").await;
        response.assert_status_ok();
        response.assert_text("ok");
        assert!(response.headers().contains_key("x-request-id"));
        Ok(())
    }

    #[tokio::test]
    async fn slow_requests_get_an_error_envelope() -> anyhow::Result<()> {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .with_middleware(&config(1));
        let server = TestServer::new(app)?;

        let response = server.get("/slow").await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"error": "request timeout"}));
        Ok(())
    }

    #[tokio::test]
    async fn panics_get_an_error_envelope() -> anyhow::Result<()> {
        let app = Router::new()
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("boom");
                    }
                    "unreachable"
                }),
            )
            .with_middleware(&config(5));
        let server = TestServer::new(app)?;

        let response = server.get("/panic").await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"error": "internal error"}));
        Ok(())
    }
}
