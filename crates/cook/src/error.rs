//! Error types for node runs.
//!
//! Errors split into two groups. Catalog errors (`Configuration`) abort a
//! whole batch before any node is touched. Everything else belongs to a
//! single node and ends that node's run without affecting its siblings.

use thiserror::Error;

/// Errors that can occur while locking, configuring or cooking a node.
#[derive(Debug, Error)]
pub enum Error {
    /// The kitchen is inconsistent or unreadable
    #[error(transparent)]
    Configuration(#[from] kitchen::Error),

    /// Node is locked by someone else
    #[error("node {node} is already locked by {author}: {reason}")]
    AlreadyLocked {
        /// Locked node
        node: String,
        /// Who holds the lock
        author: String,
        /// Why it was locked
        reason: String,
    },

    /// Tried to release a lock that isn't there
    #[error("node {node} is not locked")]
    NotLocked {
        /// Node name
        node: String,
    },

    /// Could not log in to the node or discover its address
    #[error("could not reach {node}: {message}")]
    Connectivity {
        /// Node name
        node: String,
        /// What went wrong
        message: String,
    },

    /// chef-solo is not installed on the node
    #[error("chef-solo is not installed on {node}")]
    AgentMissing {
        /// Node name
        node: String,
    },

    /// chef-solo ran and reported failure
    #[error("chef-solo could not finish configuring {node}: {message}")]
    RemoteExecution {
        /// Node name
        node: String,
        /// Last lines of the run output
        message: String,
    },

    /// A best-effort upload failed
    #[error("upload to {node} failed: {message}")]
    TransientUpload {
        /// Node name
        node: String,
        /// What failed
        message: String,
    },

    /// Transport failure not covered by a more specific variant
    #[error(transparent)]
    Transport(#[from] remote::Error),

    /// The worker pool could not be started
    #[error("could not start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// HTTP failure downloading the agent installer
    #[error("download failed: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error must abort the whole batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Configuration(e) if e.is_inconsistency())
    }

    /// Whether this is an expected lock condition rather than a failure.
    pub fn is_lock_condition(&self) -> bool {
        matches!(self, Self::AlreadyLocked { .. } | Self::NotLocked { .. })
    }

    /// Command the operator can run to fix this error, if there is one.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::AgentMissing { node } => Some(format!("sous deploy-agent {node}")),
            Self::Connectivity { node, .. } => Some(format!("ssh {node}")),
            _ => None,
        }
    }

    /// Re-tag a transport error for `node`, keeping connectivity distinct.
    pub fn from_transport(node: &str, err: remote::Error) -> Self {
        if err.is_connectivity() {
            Self::Connectivity {
                node: node.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Download(format!("HTTP {code}")),
            other => Self::Download(other.to_string()),
        }
    }
}

/// Result type for node runs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_missing_has_remediation() {
        let err = Error::AgentMissing {
            node: "web1".into(),
        };
        assert_eq!(err.remediation().as_deref(), Some("sous deploy-agent web1"));
    }

    #[test]
    fn test_missing_recipe_is_batch_fatal() {
        let err: Error = kitchen::Error::MissingRecipe {
            node: "web1".into(),
            recipe: "app".into(),
        }
        .into();
        assert!(err.is_batch_fatal());
        assert!(!err.is_lock_condition());
    }

    #[test]
    fn test_transport_connectivity_is_retagged() {
        let err = Error::from_transport(
            "web1",
            remote::Error::Connectivity {
                host: "web1".into(),
                message: "timed out".into(),
            },
        );
        assert!(matches!(err, Error::Connectivity { .. }));

        let err = Error::from_transport("web1", remote::Error::Other("x".into()));
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_lock_conditions() {
        let err = Error::NotLocked {
            node: "web1".into(),
        };
        assert!(err.is_lock_condition());
        assert!(!err.is_batch_fatal());
    }
}
