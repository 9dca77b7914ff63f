//! Error types for remote operations.
//!
//! Errors are categorized from the stderr of ssh, scp and rsync so callers
//! can tell an unreachable host from a command that ran and failed.

use thiserror::Error;

/// Categories of remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host unreachable, authentication refused, connection dropped
    Connectivity,
    /// Remote command or file not found
    NotFound,
    /// Permission denied on the remote side
    Permission,
    /// A local tool (ssh, rsync) is missing
    ToolMissing,
    /// The command ran and failed
    CommandFailed,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Connectivity => "Check that the host is up and your ssh credentials work",
            Self::NotFound => "Check that the remote path or command exists",
            Self::Permission => "Check that the deployment user has passwordless sudo",
            Self::ToolMissing => "Install ssh and rsync locally",
            Self::CommandFailed => "Check the command output for details",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during remote operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach or authenticate to the host
    #[error("cannot reach {host}: {message}")]
    Connectivity {
        /// Target host
        host: String,
        /// Details from ssh
        message: String,
    },

    /// Remote file or command not found
    #[error("not found on {host}: {message}")]
    NotFound {
        /// Target host
        host: String,
        /// What was missing
        message: String,
    },

    /// Permission denied on the remote side
    #[error("permission denied on {host}: {message}")]
    Permission {
        /// Target host
        host: String,
        /// Details from the remote side
        message: String,
    },

    /// A required local executable is not in PATH
    #[error("{0} not found in PATH")]
    ToolMissing(String),

    /// Remote command exited non-zero
    #[error("command failed on {host}: {command}: {stderr}")]
    CommandFailed {
        /// Target host
        host: String,
        /// The command that failed
        command: String,
        /// Standard error output
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connectivity { .. } => ErrorCategory::Connectivity,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::ToolMissing(_) => ErrorCategory::ToolMissing,
            Self::CommandFailed { .. } => ErrorCategory::CommandFailed,
            Self::Io(_) | Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether the host could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        self.category() == ErrorCategory::Connectivity
    }

    /// Create an error from the stderr of ssh, scp or rsync.
    ///
    /// `exit_code` 255 is ssh's own failure code and always means the
    /// connection itself failed.
    pub fn from_transport_output(
        host: &str,
        command: &str,
        stderr: &str,
        exit_code: Option<i32>,
    ) -> Self {
        let lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();

        if exit_code == Some(255)
            || lower.contains("could not resolve")
            || lower.contains("connection refused")
            || lower.contains("connection timed out")
            || lower.contains("operation timed out")
            || lower.contains("no route to host")
            || lower.contains("connection closed")
            || lower.contains("connection reset")
            || lower.contains("permission denied (publickey")
            || lower.contains("host key verification failed")
        {
            return Self::Connectivity {
                host: host.to_string(),
                message,
            };
        }

        if lower.contains("command not found") || lower.contains("no such file or directory") {
            return Self::NotFound {
                host: host.to_string(),
                message,
            };
        }

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("a password is required")
        {
            return Self::Permission {
                host: host.to_string(),
                message,
            };
        }

        Self::CommandFailed {
            host: host.to_string(),
            command: command.to_string(),
            stderr: message,
        }
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, Error>;
