//! Error types for the gateway.
//!
//! Errors fall into three groups, and the dispatcher acts on the group rather
//! than on individual variants:
//!
//! - **Recoverable transport**: connect, send and login I/O failures. The
//!   session is reset and retried after a fixed delay.
//! - **Fatal**: a rejected login, an unopenable serial device, broken
//!   configuration or an unreadable sensor. The gateway tears down and exits.
//! - **Misuse**: [`GatewayError::NotAuthenticated`] is returned when a caller
//!   tries to send before the session is logged in.
//!
//! Packets dropped by the framer are not errors; see
//! [`DropDecision`](crate::types::DropDecision).
//!
//! ```rust
//! use igate::GatewayError;
//!
//! let error = GatewayError::connection_failed("rotate.aprs2.net:14580");
//! assert!(error.is_retryable());
//! assert!(!error.is_fatal());
//!
//! let error = GatewayError::login_rejected("# logresp N0CALL unverified, server T2TEST");
//! assert!(error.is_fatal());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Transport failure during {operation}")]
    Transport {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session is {state}, refusing to send")]
    NotAuthenticated { state: String },

    #[error("Login rejected by server: {verdict}")]
    LoginRejected { verdict: String },

    #[error("Serial device error: {device}")]
    Serial {
        device: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Sensor read failed: {sensor}")]
    Sensor {
        sensor: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error in {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl GatewayError {
    /// Returns whether the session should be reset and the operation retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Connection { .. } => true,
            GatewayError::Transport { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::NotAuthenticated { .. } => false,
            GatewayError::LoginRejected { .. } => false,
            GatewayError::Serial { .. } => false,
            GatewayError::Sensor { .. } => false,
            GatewayError::Config { .. } => false,
        }
    }

    /// Returns whether the gateway must shut down instead of retrying.
    ///
    /// Credentials do not fix themselves and a missing serial device or
    /// sensor will not reappear between iterations.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::LoginRejected { .. }
                | GatewayError::Serial { .. }
                | GatewayError::Sensor { .. }
                | GatewayError::Config { .. }
        )
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(target: impl Into<String>) -> Self {
        GatewayError::Connection { target: target.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(target: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Connection { target: target.into(), source: Some(source) }
    }

    /// Helper constructor for I/O failures on an established link.
    pub fn transport(operation: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Transport { operation: operation.into(), source }
    }

    /// Helper constructor for a server verdict that did not verify the login.
    pub fn login_rejected(verdict: impl Into<String>) -> Self {
        GatewayError::LoginRejected { verdict: verdict.into() }
    }

    /// Helper constructor for serial device errors.
    pub fn serial(
        device: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        GatewayError::Serial { device: device.into(), source: Some(source.into()) }
    }

    /// Helper constructor for sensor errors.
    pub fn sensor(
        sensor: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        GatewayError::Sensor { sensor: sensor.into(), source: Some(source.into()) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        GatewayError::Config { path: path.into(), details: details.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            target in "[a-z0-9.]{1,32}:[0-9]{1,5}",
            verdict in ".*",
            details in ".*",
        ) {
            let connection = GatewayError::connection_failed(target.clone());
            prop_assert!(connection.to_string().contains(&target));

            let login = GatewayError::login_rejected(verdict.clone());
            prop_assert!(login.to_string().contains(&verdict));

            let config = GatewayError::config("/etc/igate.yaml", details.clone());
            prop_assert!(config.to_string().contains(&details));
        }
    }

    #[test]
    fn transport_errors_are_retryable_not_fatal() {
        let err = GatewayError::transport(
            "send",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"),
        );
        assert!(err.is_retryable());
        assert!(!err.is_fatal());

        let err = GatewayError::connection_failed("localhost:14580");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn credential_and_startup_errors_are_fatal() {
        assert!(GatewayError::login_rejected("unverified").is_fatal());
        assert!(GatewayError::serial("/dev/ttyUSB0", "no such device").is_fatal());
        assert!(GatewayError::sensor("cpu temperature", "missing").is_fatal());
        assert!(GatewayError::config("igate.yaml", "callsign is empty").is_fatal());
    }

    #[test]
    fn not_authenticated_is_neither() {
        let err = GatewayError::NotAuthenticated { state: "Connected".to_string() };
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Connected"));
    }

    #[test]
    fn transport_source_is_preserved() {
        let err = GatewayError::transport(
            "login",
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "server closed"),
        );
        let source = std::error::Error::source(&err).expect("source should be set");
        assert_eq!(source.to_string(), "server closed");
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<GatewayError>();
    }
}
