//! Error types for the telemetry core.
//!
//! Nothing in the ingestion path is fatal: malformed wire frames and
//! description records are dropped or skipped silently, and
//! the only user-visible failure modes are "requested source never
//! became active" and "no decode for this identifier", both reported as
//! ordinary negative results. The variants here cover the places where a
//! real cause exists and is worth chaining: opening devices, connecting
//! sockets, and reading description files.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Main error type for the telemetry core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("failed to open serial device {path}")]
    Serial {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("network source {address}:{port} failed: {reason}")]
    Network {
        address: String,
        port: u16,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("description source error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {details}")]
    Config { details: String },

    #[error("source disconnected: {reason}")]
    Disconnected { reason: String },
}

impl CoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Serial { .. } => true,
            CoreError::Network { .. } => true,
            CoreError::Disconnected { .. } => true,
            CoreError::File { .. } => false,
            CoreError::Config { .. } => false,
        }
    }

    /// Helper constructor for serial open failures.
    pub fn serial_error(path: impl Into<String>, source: tokio_serial::Error) -> Self {
        CoreError::Serial { path: path.into(), source }
    }

    /// Helper constructor for network failures with an io cause.
    pub fn network_error(
        address: impl Into<String>,
        port: u16,
        reason: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        CoreError::Network {
            address: address.into(),
            port,
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for description-file read failures.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        CoreError::File { path, source }
    }

    /// Helper constructor for configuration problems.
    pub fn config_error(details: impl Into<String>) -> Self {
        CoreError::Config { details: details.into() }
    }

    /// Helper constructor for a source that dropped mid-stream.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        CoreError::Disconnected { reason: reason.into() }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for CoreError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CoreError::Config { details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: CoreError must be Send + Sync + 'static.
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CoreError>();

        let error = CoreError::config_error("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryable_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(CoreError::network_error("10.0.0.1", 5700, "connect", io).is_retryable());
        assert!(CoreError::disconnected("peer closed").is_retryable());
        assert!(!CoreError::config_error("bad yaml").is_retryable());
        assert!(
            !CoreError::file_error(
                PathBuf::from("/missing.dbc"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            )
            .is_retryable()
        );
    }

    #[test]
    fn messages_carry_their_context() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = CoreError::network_error("10.0.0.1", 5700, "connect", io);
        let message = error.to_string();
        assert!(message.contains("10.0.0.1"));
        assert!(message.contains("5700"));
    }

    #[test]
    fn io_error_converts_to_file_variant() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: CoreError = io.into();
        assert!(matches!(error, CoreError::File { .. }));
    }
}
