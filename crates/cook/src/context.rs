//! Explicit run context.
//!
//! Everything a node run needs is passed in through [`RunContext`]: where the
//! kitchen lives, how chef-solo should run, who is running it and where
//! records go. Nothing is read from process-wide state.

use crate::error::Result;
use crate::record::RunRecord;
use crate::run::RunOutcome;
use kitchen::KitchenLayout;
use std::path::PathBuf;

/// Remote working directory used when none is configured.
pub const DEFAULT_NODE_WORK_PATH: &str = "/tmp/chef-solo";

/// chef-solo log file used when none is configured.
pub const DEFAULT_LOG_FILE: &str = "/var/log/chef/solo.log";

/// Proxy settings rendered into `client.rb`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxies {
    /// `http_proxy`
    pub http: Option<String>,
    /// `https_proxy`
    pub https: Option<String>,
    /// `no_proxy`
    pub no_proxy: Option<String>,
}

/// Extra directory mirrored to every node, best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSync {
    /// Local directory whose contents are pushed
    pub local_dir: PathBuf,
    /// Remote destination directory
    pub dest_dir: String,
}

/// How chef-solo is set up and invoked on every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Remote working directory the kitchen is mirrored into
    pub node_work_path: String,
    /// Login user that must own the working directory
    pub remote_user: Option<String>,
    /// chef-solo log level
    pub log_level: String,
    /// chef-solo output formatter
    pub formatter: Option<String>,
    /// Verbose logging in `client.rb`
    pub verbose: bool,
    /// Tee chef-solo output into `log_file` on the node
    pub enable_logs: bool,
    /// chef-solo log file on the node
    pub log_file: String,
    /// Run chef-solo with `--why-run`
    pub why_run: bool,
    /// Always rewrite the node record, even when it exists
    pub force_save: bool,
    /// Local encrypted data bag secret to install for the run
    pub encrypted_data_bag_secret: Option<PathBuf>,
    /// Pre-vendored third-party cookbooks to mirror
    pub vendored_cookbooks: Option<PathBuf>,
    /// Copy symlink targets when mirroring
    pub follow_symlinks: bool,
    /// Proxies for chef-solo
    pub proxies: Proxies,
    /// Optional extra package directory
    pub sync_packages: Option<PackageSync>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            node_work_path: DEFAULT_NODE_WORK_PATH.to_string(),
            remote_user: None,
            log_level: "info".to_string(),
            formatter: None,
            verbose: false,
            enable_logs: true,
            log_file: DEFAULT_LOG_FILE.to_string(),
            why_run: false,
            force_save: false,
            encrypted_data_bag_secret: None,
            vendored_cookbooks: None,
            follow_symlinks: false,
            proxies: Proxies::default(),
            sync_packages: None,
        }
    }
}

impl RunSettings {
    /// `<work>/<sub>` on the node.
    pub fn remote_path(&self, sub: &str) -> String {
        format!("{}/{sub}", self.node_work_path.trim_end_matches('/'))
    }

    /// `<work>/data_bags/node` on the node.
    pub fn remote_node_data_bag(&self) -> String {
        self.remote_path("data_bags/node")
    }
}

/// Who is running sous, recorded in locks and run records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operator {
    /// Local user name
    pub user: String,
    /// Current git branch of the kitchen
    pub branch: String,
}

/// Where run records go.
pub trait AuditSink: Send + Sync {
    /// Store one run record.
    fn record(&self, record: &RunRecord) -> Result<()>;
}

/// Where human-readable run notifications go.
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    fn notify(&self, message: &str) -> Result<()>;
}

/// Observer for a fleet run.
pub trait FleetProgress: Send + Sync {
    /// A node's run is starting.
    fn started(&self, _node: &str) {}

    /// A node's run has ended.
    fn finished(&self, node: &str, outcome: &RunOutcome);
}

/// Audit sink and notifier that drop everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl AuditSink for Discard {
    fn record(&self, _record: &RunRecord) -> Result<()> {
        Ok(())
    }
}

impl Notifier for Discard {
    fn notify(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

impl FleetProgress for Discard {
    fn finished(&self, _node: &str, _outcome: &RunOutcome) {}
}

/// Everything a node run reads, passed explicitly.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    /// Local kitchen
    pub layout: &'a KitchenLayout,
    /// chef-solo settings
    pub settings: &'a RunSettings,
    /// Who is running
    pub operator: &'a Operator,
    /// Run record destination
    pub audit: &'a dyn AuditSink,
    /// Notification destination
    pub notifier: &'a dyn Notifier,
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("layout", self.layout)
            .field("settings", self.settings)
            .field("operator", self.operator)
            .finish_non_exhaustive()
    }
}
