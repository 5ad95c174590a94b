/*!
 * Error types for gateway operations.
 */
use thiserror::Error;

use hubbridge_core::error::Error as CoreError;

/// Error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The pub/sub transport is not connected
    #[error("Transport not connected")]
    NotConnected,

    /// A TCP connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote shell rejected or broke the session
    #[error("Shell error: {0}")]
    Shell(String),

    /// An operation did not complete in time
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// A wire message or device file did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A device model is not present in the catalog
    #[error("Unsupported model: {0}")]
    Catalog(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create a new connection error
    pub fn connection<S: AsRef<str>>(msg: S) -> Self {
        GatewayError::Connection(msg.as_ref().to_string())
    }

    /// Create a new shell error
    pub fn shell<S: AsRef<str>>(msg: S) -> Self {
        GatewayError::Shell(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        GatewayError::Timeout(msg.as_ref().to_string())
    }

    /// Create a new protocol error
    pub fn protocol<S: AsRef<str>>(msg: S) -> Self {
        GatewayError::Protocol(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        GatewayError::Other(msg.as_ref().to_string())
    }

    /// Whether the failure is a connectivity problem that the provisioning
    /// loop should simply retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::NotConnected
                | GatewayError::Connection(_)
                | GatewayError::Timeout(_)
                | GatewayError::Io(_)
                | GatewayError::Core(CoreError::Timeout(_))
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::NotConnected.is_transient());
        assert!(GatewayError::timeout("login").is_transient());
        assert!(GatewayError::Core(CoreError::timeout("cmd")).is_transient());
        assert!(!GatewayError::protocol("bad json").is_transient());
        assert!(!GatewayError::Catalog("lumi.unknown".into()).is_transient());
    }
}
