//! One node's chef-solo run.
//!
//! ```text
//! Idle -> LockChecked -> Skipped
//!                     -> Synchronized -> Executed -> Cleaned
//! ```
//!
//! Dummy nodes and locked nodes are skipped. Otherwise the node is
//! configured, its address discovered if missing, its record saved locally,
//! the kitchen mirrored to it and chef-solo run. Everything pushed for the
//! run is removed again by [`NodeRun`] whichever way the run ends.

use crate::agent::{self, SECRET_PATH};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::lock::LockCoordinator;
use crate::record::{self, RunRecord, RunStatus};
use kitchen::Node;
use kitchen::catalog::{save_node, write_tmp_node};
use remote::{CommandOutput, MirrorOptions, Transport, shell_quote};
use std::fs;
use std::path::PathBuf;

/// Where the node record is installed for chef-solo.
pub const REMOTE_NODE_JSON: &str = "/etc/chef/node.json";

/// Marker chef prints when it dies with a stack trace.
pub const FATAL_MARKER: &str = "FATAL: Stacktrace dumped";

/// Markers chef prints at the end of a completed run.
pub const COMPLETION_MARKERS: &[&str] = &["Chef Run complete", "Report handlers complete"];

/// Library that gives chef-solo environment support.
const ENVIRONMENT_SHIM: &str = include_str!("assets/environment.rb");

/// Lines of chef output kept in a failure message.
const FAILURE_TAIL_LINES: usize = 5;

/// Why a node was not cooked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The node is a placeholder
    Dummy,
    /// Someone holds the node's lock
    Locked {
        /// Lock holder
        author: String,
        /// Lock reason
        reason: String,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "dummy node"),
            Self::Locked { author, reason } => write!(f, "locked by {author}: {reason}"),
        }
    }
}

/// How a node's run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing was done
    Skipped(SkipReason),
    /// chef-solo completed
    Succeeded,
    /// The run failed
    Failed(Error),
}

impl RunOutcome {
    /// Whether the node failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Cook one node.
///
/// Never returns an error: every per-node failure ends up in
/// [`RunOutcome::Failed`]. Runs that got past the lock check are recorded
/// and announced.
pub fn run_node(ctx: &RunContext<'_>, node: &Node, transport: &dyn Transport) -> RunOutcome {
    if node.is_dummy() {
        log::info!("[{}] skipping dummy node", node.name);
        return RunOutcome::Skipped(SkipReason::Dummy);
    }

    let outcome = match converge(ctx, node, transport) {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::Failed(e),
    };
    conclude(ctx, node, outcome)
}

/// Log and record how a node's run ended. Skipped runs leave no record.
pub(crate) fn conclude(ctx: &RunContext<'_>, node: &Node, outcome: RunOutcome) -> RunOutcome {
    let status = match &outcome {
        RunOutcome::Skipped(_) => None,
        RunOutcome::Succeeded => Some(RunStatus::Successful),
        RunOutcome::Failed(e) => {
            log::error!("[{}] {e}", node.name);
            Some(RunStatus::Failed)
        }
    };
    if let Some(status) = status {
        record::report(ctx, &RunRecord::new(node, ctx.operator, status, ""));
    }
    outcome
}

fn converge(ctx: &RunContext<'_>, node: &Node, transport: &dyn Transport) -> Result<RunOutcome> {
    let locks = LockCoordinator::new(transport);
    if locks.is_locked()? {
        let info = locks.info()?;
        log::warn!(
            "[{}] skipping, locked by {}: {}",
            node.name,
            info.author,
            info.reason
        );
        return Ok(RunOutcome::Skipped(SkipReason::Locked {
            author: info.author,
            reason: info.reason,
        }));
    }

    agent::configure(ctx, node, transport)?;

    let mut node = node.clone();
    let discovered = discover_ipaddress(&mut node, transport)?;
    // saved under the kitchen's node name, never the address ssh resolved
    save_node(ctx.layout, &node, discovered || ctx.settings.force_save)?;

    let run = NodeRun::open(ctx, &node, transport)?;
    run.synchronize()?;
    let output = run.execute()?;
    classify(&node.name, &output)?;

    log::info!("[{}] node correctly configured", node.name);
    Ok(RunOutcome::Succeeded)
}

/// Ask ohai for the node's address when the record has none.
///
/// Returns whether an address was added.
pub fn discover_ipaddress(node: &mut Node, transport: &dyn Transport) -> Result<bool> {
    if node.ipaddress().is_some() {
        return Ok(false);
    }

    let connectivity = |message: String| Error::Connectivity {
        node: node.name.clone(),
        message,
    };
    let output = transport
        .execute("ohai -l warn ipaddress", true)
        .map_err(|e| connectivity(e.to_string()))?;
    if !output.success() {
        return Err(connectivity(format!(
            "could not discover ipaddress: {}",
            output.combined().trim()
        )));
    }

    let address = serde_json::from_str::<Vec<String>>(output.stdout.trim())
        .ok()
        .and_then(|addresses| addresses.into_iter().next())
        .ok_or_else(|| {
            connectivity(format!(
                "could not parse ohai's output for ipaddress: {}",
                output.stdout.trim()
            ))
        })?;

    log::info!("[{}] discovered ipaddress {address}", node.name);
    node.set_ipaddress(address);
    Ok(true)
}

/// Decide whether chef-solo's output describes a successful run.
pub fn classify(node: &str, output: &CommandOutput) -> Result<()> {
    let text = output.combined();
    if agent::missing_agent(&text) {
        return Err(Error::AgentMissing {
            node: node.to_string(),
        });
    }

    let completed = COMPLETION_MARKERS.iter().any(|m| text.contains(m));
    if output.success() && !text.contains(FATAL_MARKER) && completed {
        return Ok(());
    }

    let lines: Vec<&str> = text.lines().collect();
    let tail = lines[lines.len().saturating_sub(FAILURE_TAIL_LINES)..].join("\n");
    Err(Error::RemoteExecution {
        node: node.to_string(),
        message: if tail.is_empty() {
            format!("exit status {:?}", output.exit_code)
        } else {
            tail
        },
    })
}

/// The artifacts of one run, removed again on drop.
///
/// Covers the local `tmp_<name>.json`, the node record installed as
/// `/etc/chef/node.json`, the mirrored node data bag, the record chef-solo
/// writes under `<work>/nodes/` and the data bag secret.
pub struct NodeRun<'a> {
    ctx: &'a RunContext<'a>,
    node: &'a Node,
    transport: &'a dyn Transport,
    tmp_file: PathBuf,
}

impl<'a> NodeRun<'a> {
    /// Write the transient node document and start guarding the run.
    pub fn open(ctx: &'a RunContext<'a>, node: &'a Node, transport: &'a dyn Transport) -> Result<Self> {
        let run = Self {
            ctx,
            node,
            transport,
            tmp_file: ctx.layout.tmp_node_file(&node.name),
        };
        write_tmp_node(ctx.layout, node)?;
        Ok(run)
    }

    fn remote_err(&self, e: remote::Error) -> Error {
        Error::from_transport(&self.node.name, e)
    }

    /// Push the node record, the kitchen and the environment shim.
    pub fn synchronize(&self) -> Result<()> {
        let settings = self.ctx.settings;
        log::info!(
            "[{}] synchronizing nodes, environments, roles, cookbooks and data bags",
            self.node.name
        );

        self.transport
            .upload(&self.tmp_file, REMOTE_NODE_JSON, true)
            .and_then(|()| self.transport.own_by_root(REMOTE_NODE_JSON, "400"))
            .map_err(|e| self.remote_err(e))?;
        if let Err(e) = fs::remove_file(&self.tmp_file) {
            log::debug!("could not remove {}: {e}", self.tmp_file.display());
        }

        if let Some(secret) = &settings.encrypted_data_bag_secret {
            self.transport
                .upload(secret, SECRET_PATH, true)
                .and_then(|()| self.transport.own_by_root(SECRET_PATH, "600"))
                .map_err(|e| self.remote_err(e))?;
        }

        let options = MirrorOptions {
            follow_symlinks: settings.follow_symlinks,
            quiet: settings.log_level != "debug",
            ..MirrorOptions::default()
        };
        self.transport
            .mirror_sync(&self.kitchen_paths(), &settings.node_work_path, &options)
            .map_err(|e| self.remote_err(e))?;

        if let Err(e) = self.sync_packages(&options) {
            log::warn!("[{}] {e}; continuing", self.node.name);
        }

        self.push_environment_shim()
    }

    /// Local directories mirrored into the working directory.
    fn kitchen_paths(&self) -> Vec<PathBuf> {
        let layout = self.ctx.layout;
        let mut paths = vec![
            layout.data_bags_dir(),
            layout.roles_dir(),
            layout.environments_dir(),
        ];
        paths.extend(layout.cookbook_paths.iter().map(|p| layout.root.join(p)));
        paths.extend(self.ctx.settings.vendored_cookbooks.iter().cloned());
        paths.retain(|p| p.is_dir());
        paths
    }

    /// Best-effort mirror of the extra package directory.
    fn sync_packages(&self, options: &MirrorOptions) -> Result<()> {
        let Some(packages) = &self.ctx.settings.sync_packages else {
            return Ok(());
        };
        let transient = |message: String| Error::TransientUpload {
            node: self.node.name.clone(),
            message,
        };

        log::info!(
            "[{}] uploading packages from {} to {}",
            self.node.name,
            packages.local_dir.display(),
            packages.dest_dir
        );
        let mut entries: Vec<PathBuf> = fs::read_dir(&packages.local_dir)
            .map_err(|e| transient(format!("package upload failed: {e}")))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        self.transport
            .mirror_sync(&entries, &packages.dest_dir, options)
            .map_err(|e| transient(format!("package upload failed: {e}")))
    }

    fn push_environment_shim(&self) -> Result<()> {
        let first = self
            .ctx
            .layout
            .cookbook_paths
            .first()
            .map_or("site-cookbooks", String::as_str);
        let lib_dir = self
            .ctx
            .settings
            .remote_path(&format!("{first}/chef_solo_envs/libraries"));

        self.transport
            .run(&format!("mkdir -p {}", shell_quote(&lib_dir)), true)
            .and_then(|_| {
                self.transport.write_file(
                    &format!("{lib_dir}/environment.rb"),
                    ENVIRONMENT_SHIM.as_bytes(),
                    true,
                )
            })
            .map_err(|e| self.remote_err(e))
    }

    /// The chef-solo command line for this run.
    pub fn command(&self) -> String {
        let settings = self.ctx.settings;
        let mut cmd = "RUBYOPT=-Ku chef-solo".to_string();
        if settings.why_run {
            cmd.push_str(" --why-run");
        }
        cmd.push_str(&format!(
            " -l {} -j {REMOTE_NODE_JSON}",
            shell_quote(&settings.log_level)
        ));
        if settings.enable_logs {
            cmd.push_str(&format!(" | tee {}", shell_quote(&settings.log_file)));
        }
        cmd
    }

    /// Rotate the previous log and run chef-solo.
    pub fn execute(&self) -> Result<CommandOutput> {
        let log_file = shell_quote(&self.ctx.settings.log_file);
        if let Err(e) = self
            .transport
            .execute(&format!("mv {log_file} {log_file}.1"), true)
        {
            log::debug!("[{}] could not rotate chef log: {e}", self.node.name);
        }

        let command = self.command();
        log::info!("[{}] cooking", self.node.name);
        log::debug!("[{}] {command}", self.node.name);
        self.transport
            .execute(&command, true)
            .map_err(|e| self.remote_err(e))
    }

    fn cleanup(&self) {
        let settings = self.ctx.settings;
        let short_host = self.transport.host().split('.').next().unwrap_or_default();

        let mut targets = vec![
            (settings.remote_node_data_bag(), true),
            (REMOTE_NODE_JSON.to_string(), false),
            (settings.remote_path(&format!("nodes/{short_host}.json")), false),
        ];
        if settings.encrypted_data_bag_secret.is_some() {
            targets.push((SECRET_PATH.to_string(), false));
        }

        for (path, recursive) in targets {
            if let Err(e) = self.transport.remove(&path, recursive) {
                log::warn!("[{}] could not remove {path}: {e}", self.node.name);
            }
        }

        if self.tmp_file.exists()
            && let Err(e) = fs::remove_file(&self.tmp_file)
        {
            log::warn!("could not remove {}: {e}", self.tmp_file.display());
        }
    }
}

impl Drop for NodeRun<'_> {
    fn drop(&mut self) {
        log::debug!("[{}] cleaning up", self.node.name);
        self.cleanup();
    }
}
