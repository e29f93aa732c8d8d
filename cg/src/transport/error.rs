//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the portal
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid proxy URL '{url}': {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl TransportError {
    /// Map a reqwest error, keeping timeouts and connect failures distinct
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Errors that come from configuration rather than the network
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::InvalidProxy { .. } | Self::InvalidHeader { .. } | Self::Build(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!TransportError::Connect("refused".to_string()).is_timeout());
    }

    #[test]
    fn test_is_setup() {
        assert!(
            TransportError::InvalidProxy {
                url: "::".to_string(),
                reason: "bad".to_string()
            }
            .is_setup()
        );
        assert!(!TransportError::Timeout(Duration::from_secs(1)).is_setup());
        assert!(!TransportError::Connect("refused".to_string()).is_setup());
    }

    #[test]
    fn test_display() {
        let err = TransportError::Timeout(Duration::from_millis(1000));
        assert_eq!(err.to_string(), "Request timed out after 1s");
    }
}
