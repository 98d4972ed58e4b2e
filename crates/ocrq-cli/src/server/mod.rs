//! HTTP server startup, middleware and graceful shutdown.

mod error;
mod http_server;
mod middleware;
mod shutdown;

pub use http_server::serve_http;
pub use middleware::RouterMiddlewareExt;
pub use shutdown::shutdown_signal;
