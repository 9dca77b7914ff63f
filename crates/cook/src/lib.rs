//! # cook
//!
//! Run chef-solo on a fleet of nodes from a local kitchen.
//!
//! - [`lock`]: advisory per-node locks
//! - [`agent`]: chef-solo setup and installation
//! - [`run`]: one node's run, from lock check to cleanup
//! - [`dispatch`]: many node runs over a bounded worker pool
//! - [`record`]: run records for audit and notification
//!
//! All of it takes an explicit [`RunContext`] and talks to nodes through
//! [`remote::Transport`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod record;
pub mod run;

#[cfg(test)]
mod testing;

pub use context::{
    AuditSink, Discard, FleetProgress, Notifier, Operator, PackageSync, Proxies, RunContext,
    RunSettings,
};
pub use dispatch::{DEFAULT_JOBS, FleetSummary, dispatch};
pub use error::{Error, Result};
pub use lock::{LockCoordinator, LockInfo};
pub use record::{RunRecord, RunStatus};
pub use run::{RunOutcome, SkipReason, run_node};
