//! Advisory per-node locks.
//!
//! A lock is a small JSON file on the node. Its presence alone means the node
//! is locked; there is no expiry and no ownership check on release. Checking
//! and taking a lock are separate steps, so two operators racing on the same
//! node can both succeed.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::record::{self, RunRecord, RunStatus};
use kitchen::Node;
use remote::Transport;
use serde::{Deserialize, Serialize};

/// Where the lock artifact lives on a node.
pub const LOCK_PATH: &str = "/etc/chef/lockfile";

/// Author reported for a lock file that can't be parsed.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Contents of the lock artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Why the node was locked
    pub reason: String,
    /// Who locked it
    pub author: String,
}

/// Lock operations against one node.
pub struct LockCoordinator<'a> {
    transport: &'a dyn Transport,
}

impl<'a> LockCoordinator<'a> {
    /// Coordinate locks over `transport`.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    fn host(&self) -> &str {
        self.transport.host()
    }

    /// Whether the lock artifact exists.
    pub fn is_locked(&self) -> Result<bool> {
        self.transport
            .exists(LOCK_PATH)
            .map_err(|e| Error::from_transport(self.host(), e))
    }

    /// Read who holds the lock and why.
    ///
    /// A lock file that isn't a lock record still locks the node; its raw
    /// content becomes the reason and the author is [`UNKNOWN_AUTHOR`].
    pub fn info(&self) -> Result<LockInfo> {
        let content = self
            .transport
            .read_file(LOCK_PATH)
            .map_err(|e| Error::from_transport(self.host(), e))?;
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[{}] unreadable lock file ({e}), treating as locked", self.host());
            LockInfo {
                reason: content.trim().to_string(),
                author: UNKNOWN_AUTHOR.to_string(),
            }
        }))
    }

    /// Lock `node` with `reason`, as the context's operator.
    ///
    /// Fails with [`Error::AlreadyLocked`] and leaves the existing lock
    /// untouched when the node is locked already.
    pub fn acquire(&self, ctx: &RunContext<'_>, node: &Node, reason: &str) -> Result<LockInfo> {
        if self.is_locked()? {
            let existing = self.info()?;
            return Err(Error::AlreadyLocked {
                node: node.name.clone(),
                author: existing.author,
                reason: existing.reason,
            });
        }

        let info = LockInfo {
            reason: reason.to_string(),
            author: ctx.operator.user.clone(),
        };
        let content = serde_json::to_vec_pretty(&info)?;
        self.transport
            .run("mkdir -p /etc/chef", true)
            .and_then(|_| self.transport.write_file(LOCK_PATH, &content, true))
            .and_then(|()| self.transport.own_by_root(LOCK_PATH, "764"))
            .map_err(|e| Error::from_transport(self.host(), e))?;

        log::info!("[{}] locked by {}: {reason}", node.name, info.author);
        record::report(
            ctx,
            &RunRecord::new(node, ctx.operator, RunStatus::Successful, reason),
        );
        Ok(info)
    }

    /// Remove the lock on `node`.
    ///
    /// Fails with [`Error::NotLocked`] when there is nothing to remove.
    pub fn release(&self, ctx: &RunContext<'_>, node: &Node) -> Result<()> {
        if !self.is_locked()? {
            return Err(Error::NotLocked {
                node: node.name.clone(),
            });
        }

        self.transport
            .remove(LOCK_PATH, false)
            .map_err(|e| Error::from_transport(self.host(), e))?;

        log::info!("[{}] unlocked", node.name);
        record::report(
            ctx,
            &RunRecord::new(node, ctx.operator, RunStatus::Successful, ""),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use remote::MemoryTransport;

    #[test]
    fn test_acquire_writes_artifact_and_record() {
        let harness = Harness::new();
        let transport = MemoryTransport::new("web1");
        let node = Node::new("web1");

        let info = LockCoordinator::new(&transport)
            .acquire(&harness.ctx(), &node, "db migration")
            .unwrap();

        assert_eq!(info.author, "alice");
        let stored: LockInfo =
            serde_json::from_slice(&transport.file(LOCK_PATH).unwrap()).unwrap();
        assert_eq!(stored, info);

        let records = harness.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lock, "db migration");
        assert_eq!(records[0].status, RunStatus::Successful);
    }

    #[test]
    fn test_acquire_twice_keeps_original_lock() {
        let harness = Harness::new();
        let transport = MemoryTransport::new("web1");
        let node = Node::new("web1");
        let locks = LockCoordinator::new(&transport);

        locks.acquire(&harness.ctx(), &node, "first").unwrap();
        let err = locks.acquire(&harness.ctx(), &node, "second").unwrap_err();

        match err {
            Error::AlreadyLocked { author, reason, .. } => {
                assert_eq!(author, "alice");
                assert_eq!(reason, "first");
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(locks.info().unwrap().reason, "first");
        assert_eq!(harness.audit.records().len(), 1);
    }

    #[test]
    fn test_unparsable_lock_file_still_locks() {
        let harness = Harness::new();
        let transport = MemoryTransport::new("web1");
        transport.put_file(LOCK_PATH, b"locked by ops, do not touch\n");
        let locks = LockCoordinator::new(&transport);

        let info = locks.info().unwrap();
        assert_eq!(info.author, UNKNOWN_AUTHOR);
        assert_eq!(info.reason, "locked by ops, do not touch");

        let err = locks
            .acquire(&harness.ctx(), &Node::new("web1"), "deploy")
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyLocked { ref author, .. } if author == UNKNOWN_AUTHOR));
        assert_eq!(
            transport.file(LOCK_PATH).unwrap(),
            b"locked by ops, do not touch\n"
        );
        assert!(harness.audit.records().is_empty());
    }

    #[test]
    fn test_release_unlocked_node_fails() {
        let harness = Harness::new();
        let transport = MemoryTransport::new("web1");

        let err = LockCoordinator::new(&transport)
            .release(&harness.ctx(), &Node::new("web1"))
            .unwrap_err();

        assert!(matches!(err, Error::NotLocked { .. }));
        assert!(transport.file(LOCK_PATH).is_none());
        assert!(harness.audit.records().is_empty());
    }

    #[test]
    fn test_release_removes_artifact() {
        let harness = Harness::new();
        let transport = MemoryTransport::new("web1");
        let node = Node::new("web1");
        let locks = LockCoordinator::new(&transport);

        locks.acquire(&harness.ctx(), &node, "maintenance").unwrap();
        locks.release(&harness.ctx(), &node).unwrap();

        assert!(!locks.is_locked().unwrap());
        assert_eq!(harness.audit.records().len(), 2);
        assert_eq!(harness.audit.records()[1].lock, "");
    }

    #[test]
    fn test_unreachable_node_is_connectivity() {
        let transport = MemoryTransport::new("web1");
        transport.unreachable_on(LOCK_PATH);
        let err = LockCoordinator::new(&transport).is_locked().unwrap_err();
        assert!(matches!(err, Error::Connectivity { .. }));
    }
}
