//! Error types for kitchen loading and attribute resolution.
//!
//! Every variant except I/O and parse failures describes an inconsistent
//! kitchen: a reference that points nowhere or a role graph that never ends.
//! Those are shared by all nodes, so callers abort the whole batch on them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a kitchen or resolving a node.
#[derive(Debug, Error)]
pub enum Error {
    /// A run list names a recipe that no cookbook provides
    #[error("could not find recipe '{recipe}' while building node data bag for '{node}'")]
    MissingRecipe {
        /// Node whose run list was being expanded
        node: String,
        /// Recipe name as written in the run list
        recipe: String,
    },

    /// A run list names a role with no file under `roles/`
    #[error("could not find role '{role}' referenced by '{node}'")]
    MissingRole {
        /// Node whose run list was being expanded
        node: String,
        /// Role name as written in the run list
        role: String,
    },

    /// A node belongs to an environment with no file under `environments/`
    #[error("could not find environment '{environment}' for node '{node}'")]
    MissingEnvironment {
        /// Node declaring the environment
        node: String,
        /// Environment name
        environment: String,
    },

    /// Roles include each other in a loop
    #[error("role inclusion cycle: {path}")]
    RoleCycle {
        /// The roles on the cycle, joined with `->`
        path: String,
    },

    /// Two node names map to the same data bag item
    #[error("nodes '{first}' and '{second}' share data bag id '{id}'")]
    DuplicateDataBagId {
        /// The shared id
        id: String,
        /// Node that claimed the id first
        first: String,
        /// Node that collided with it
        second: String,
    },

    /// No node file with the given name
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A kitchen file is not valid JSON for its kind
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal error
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Whether this error means the kitchen itself is inconsistent.
    ///
    /// Inconsistencies are shared by every node, so no node should be
    /// touched once one is found.
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::MissingRecipe { .. }
                | Self::MissingRole { .. }
                | Self::MissingEnvironment { .. }
                | Self::RoleCycle { .. }
                | Self::DuplicateDataBagId { .. }
        )
    }
}

/// Result type for kitchen operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_recipe_message_names_node_and_recipe() {
        let err = Error::MissingRecipe {
            node: "web1.example.com".into(),
            recipe: "nginx".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'nginx'"));
        assert!(msg.contains("'web1.example.com'"));
    }

    #[test]
    fn test_inconsistency_classification() {
        assert!(Error::RoleCycle { path: "a -> a".into() }.is_inconsistency());
        assert!(
            Error::MissingRole {
                node: "n".into(),
                role: "r".into()
            }
            .is_inconsistency()
        );
        assert!(
            Error::DuplicateDataBagId {
                id: "a_b".into(),
                first: "a.b".into(),
                second: "a_b".into()
            }
            .is_inconsistency()
        );
        assert!(!Error::NodeNotFound("n".into()).is_inconsistency());
    }
}
