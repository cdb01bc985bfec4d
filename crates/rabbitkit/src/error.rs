//! Error types for rabbitmqctl operations.
//!
//! Errors are categorized from the command's stderr so that front ends can
//! tell an unreachable node from a missing user or a refused `sudo`.

use declarative::BackendError;
use thiserror::Error;

/// Categories of rabbitmqctl errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User or virtual host does not exist
    NotFound,
    /// Broker node unreachable or not running
    NodeDown,
    /// Permission denied (sudo refused, cookie mismatch)
    Permission,
    /// User already exists
    AlreadyExists,
    /// rabbitmqctl not found
    CtlNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "No such user or virtual host",
            Self::NodeDown => "RabbitMQ node unreachable",
            Self::Permission => "Permission denied",
            Self::AlreadyExists => "User already exists",
            Self::CtlNotFound => "rabbitmqctl not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Create the virtual host first or check the user name",
            Self::NodeDown => "Check that rabbitmq-server is running on this host",
            Self::Permission => {
                "Set `runas` to the broker's OS user and allow passwordless sudo for it"
            }
            Self::AlreadyExists => "No action needed - the user exists",
            Self::CtlNotFound => "Install rabbitmq-server or set `rabbitmqctl` in [settings]",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while driving rabbitmqctl.
#[derive(Debug, Error)]
pub enum Error {
    /// rabbitmqctl is not installed or not found in PATH
    #[error("rabbitmqctl not found. Install rabbitmq-server or configure its path")]
    CtlNotFound,

    /// Referenced user or virtual host does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Message reported by rabbitmqctl
        message: String,
    },

    /// Node is down or unreachable
    #[error("node unreachable: {message}")]
    NodeDown {
        /// Message reported by rabbitmqctl
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// User already exists
    #[error("user already exists: {name}")]
    AlreadyExists {
        /// Name of the existing user
        name: String,
    },

    /// Command execution failed
    #[error("{message}: {stderr}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// Output could not be parsed
    #[error("unexpected rabbitmqctl output: {0}")]
    Parse(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CtlNotFound => ErrorCategory::CtlNotFound,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::NodeDown { .. } => ErrorCategory::NodeDown,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            _ => ErrorCategory::Other,
        }
    }

    /// Create an error from rabbitmqctl output.
    ///
    /// Analyzes stderr (and stdout, where older releases print errors) to
    /// categorize the error appropriately.
    pub fn from_ctl_output(output: &str, user: Option<&str>, action: &str) -> Self {
        let lower = output.to_lowercase();
        let message = output.trim().to_string();

        if lower.contains("user_already_exists") {
            return Error::AlreadyExists {
                name: user.unwrap_or("unknown").to_string(),
            };
        }

        if lower.contains("no_such_user") || lower.contains("no_such_vhost") {
            return Error::NotFound { message };
        }

        if lower.contains("nodedown")
            || lower.contains("unable to connect to node")
            || lower.contains("unable to perform an operation on node")
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            return Error::NodeDown { message };
        }

        if lower.contains("permission denied")
            || lower.contains("access_refused")
            || lower.contains("a password is required")
            || lower.contains("is not in the sudoers file")
        {
            return Error::Permission { message };
        }

        Error::CommandFailed {
            message: format!(
                "rabbitmqctl {action} failed{}",
                user.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: message,
        }
    }
}

impl From<Error> for BackendError {
    fn from(err: Error) -> Self {
        BackendError::new(err.to_string())
    }
}

/// Result type for rabbitmqctl operations.
pub type Result<T> = std::result::Result<T, Error>;
