//! Server lifecycle errors.

use std::io;

/// Result type for server operations.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Errors that stop the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid server configuration.
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),

    /// Failed to bind to the specified address.
    #[error("Failed to bind to address {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Runtime server error.
    #[error("Runtime error: {0}")]
    Runtime(#[source] io::Error),
}

impl ServerError {
    /// Creates an invalid configuration error from an anyhow error.
    pub fn invalid_config(err: &anyhow::Error) -> Self {
        Self::InvalidConfig(format!("{err:#}"))
    }

    /// Returns whether retrying (or changing the environment) may help.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidConfig(_) => false,
            Self::BindError { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::AddrInUse
                    | io::ErrorKind::AddrNotAvailable
            ),
            Self::Runtime(err) => matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_errors_in_use_are_recoverable() {
        let err = ServerError::BindError {
            address: "127.0.0.1:3000".to_owned(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("127.0.0.1:3000"));
    }

    #[test]
    fn invalid_config_is_not_recoverable() {
        let err = ServerError::invalid_config(&anyhow::anyhow!("port 80"));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Invalid server configuration: port 80");
    }
}
