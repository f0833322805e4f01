//! Error types for redbridge operations

use thiserror::Error;

use crate::BackendId;

/// Main error type for every client, pool and cache operation
///
/// A missing key is never an error: reads report absence as `Ok(None)`.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No configuration was registered for the identity
    #[error("unconfigured backend: {0}")]
    Unconfigured(BackendId),

    /// The identity already has a live pool, its configuration is frozen
    #[error("cannot modify configuration for {0} after first use")]
    ConfigurationLocked(BackendId),

    /// Malformed configuration (usually a connection URL)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transport failure (refused, dropped, authentication)
    #[error("connection error: {0}")]
    Connection(String),

    /// No connection could be acquired within the retry timeout
    #[error("timed out acquiring a connection")]
    Timeout,

    /// Value could not be converted to its stored representation
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Stored representation could not be converted back to a value
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The store rejected the command
    #[error("backend error: {0}")]
    Backend(String),

    /// The store answered with a reply of the wrong shape
    #[error("unexpected response to {command}: {response}")]
    UnexpectedResponse { command: String, response: String },

    /// The subscription connection is gone
    #[error("subscription connection closed")]
    SubscriptionClosed,

    /// The owning service has been shut down
    #[error("redis storage has been shut down")]
    ShutDown,
}

impl Error {
    /// Whether the failure came from the transport rather than the command
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout)
    }

    /// Whether the failure is an encode or decode failure
    pub fn is_coding(&self) -> bool {
        matches!(self, Error::Encoding(_) | Error::Decoding(_))
    }
}

/// Result type alias for redbridge operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Unconfigured(BackendId::new("cache"));
        assert_eq!(err.to_string(), "unconfigured backend: cache");

        let err = Error::ConfigurationLocked(BackendId::default());
        assert_eq!(
            err.to_string(),
            "cannot modify configuration for default after first use"
        );

        let err = Error::UnexpectedResponse {
            command: "TTL".to_string(),
            response: "Nil".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected response to TTL: Nil");
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::Timeout.is_connection());
        assert!(Error::Connection("refused".into()).is_connection());
        assert!(!Error::Backend("ERR".into()).is_connection());
        assert!(Error::Decoding("eof".into()).is_coding());
        assert!(!Error::Timeout.is_coding());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::Timeout;
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
