//! Error type surfaced by resource backends

use thiserror::Error;

/// Failure reported by a [`ResourceBackend`](crate::ResourceBackend) call.
///
/// This is the only error kind the reconciler ever sees. It covers command
/// failures, transport errors and unparseable output alike; the message is
/// copied verbatim into the failure comment of the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    /// Human-readable description of what went wrong
    pub message: String,
}

impl BackendError {
    /// Create a backend error from any displayable message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for BackendError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for BackendError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message() {
        let err = BackendError::new("timeout");
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(BackendError::from("boom"), BackendError::new("boom"));
        assert_eq!(
            BackendError::from("node down".to_string()).message,
            "node down"
        );
    }
}
