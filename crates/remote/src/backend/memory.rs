//! In-memory backend.
//!
//! Simulates a node's filesystem as a map of path to bytes and records every
//! command it is asked to run. Commands succeed with empty output unless a
//! response has been scripted for them. Used to exercise orchestration
//! without a real host.

use super::Transport;
use crate::error::{Error, Result};
use crate::types::{CommandOutput, MirrorOptions};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    responses: Vec<(String, CommandOutput)>,
    unreachable: Vec<String>,
    synced: Vec<(Vec<PathBuf>, String)>,
    fail_mirror_for: Vec<String>,
}

/// A fake node held entirely in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    host: String,
    state: Mutex<State>,
}

impl MemoryTransport {
    /// Create an empty node named `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded state from others.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Answer any command containing `pattern` with `output`.
    ///
    /// Later scripts take priority over earlier ones.
    pub fn respond(&self, pattern: impl Into<String>, output: CommandOutput) -> &Self {
        self.state().responses.push((pattern.into(), output));
        self
    }

    /// Fail any command containing `pattern` with a connectivity error.
    pub fn unreachable_on(&self, pattern: impl Into<String>) -> &Self {
        self.state().unreachable.push(pattern.into());
        self
    }

    /// Fail mirror syncs into remote directories containing `pattern`.
    pub fn fail_mirror_into(&self, pattern: impl Into<String>) -> &Self {
        self.state().fail_mirror_for.push(pattern.into());
        self
    }

    /// Place a file on the node.
    pub fn put_file(&self, remote: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.state().files.insert(remote.into(), contents.into());
    }

    /// Contents of a file on the node.
    pub fn file(&self, remote: &str) -> Option<Vec<u8>> {
        self.state().files.get(remote).cloned()
    }

    /// Every path currently on the node.
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Every mirror sync so far as `(local paths, remote dir)`.
    pub fn synced(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.state().synced.clone()
    }

    fn connectivity(&self, message: &str) -> Error {
        Error::Connectivity {
            host: self.host.clone(),
            message: message.to_string(),
        }
    }

    fn check_reachable(&self, what: &str) -> Result<()> {
        let unreachable = self
            .state()
            .unreachable
            .iter()
            .any(|pattern| what.contains(pattern.as_str()));
        if unreachable {
            return Err(self.connectivity(&format!("simulated failure for '{what}'")));
        }
        Ok(())
    }
}

fn under(path: &str, dir: &str) -> bool {
    path == dir
        || path
            .strip_prefix(dir.trim_end_matches('/'))
            .is_some_and(|rest| rest.starts_with('/'))
}

impl Transport for MemoryTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn execute(&self, command: &str, _privileged: bool) -> Result<CommandOutput> {
        self.check_reachable(command)?;
        let mut state = self.state();
        state.commands.push(command.to_string());

        let scripted = state
            .responses
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone());
        Ok(scripted.unwrap_or_else(|| CommandOutput::ok("")))
    }

    fn upload(&self, local: &Path, remote: &str, _privileged: bool) -> Result<()> {
        self.check_reachable(remote)?;
        let contents = fs::read(local)?;
        self.state().files.insert(remote.to_string(), contents);
        Ok(())
    }

    fn mirror_sync(
        &self,
        local_paths: &[PathBuf],
        remote_dir: &str,
        options: &MirrorOptions,
    ) -> Result<()> {
        self.check_reachable(remote_dir)?;
        if self
            .state()
            .fail_mirror_for
            .iter()
            .any(|p| remote_dir.contains(p.as_str()))
        {
            return Err(Error::CommandFailed {
                host: self.host.clone(),
                command: "rsync".to_string(),
                stderr: format!("simulated rsync failure into {remote_dir}"),
            });
        }

        let mut copied = BTreeMap::new();
        let mut roots = Vec::new();
        for local in local_paths {
            let Some(name) = local.file_name() else {
                continue;
            };
            let root = format!(
                "{}/{}",
                remote_dir.trim_end_matches('/'),
                name.to_string_lossy()
            );
            for entry in WalkDir::new(local) {
                let entry = entry.map_err(|e| Error::Other(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(local)
                    .map_err(|e| Error::Other(e.to_string()))?;
                let remote = if rel.as_os_str().is_empty() {
                    root.clone()
                } else {
                    format!("{root}/{}", rel.to_string_lossy())
                };
                copied.insert(remote, fs::read(entry.path())?);
            }
            roots.push(root);
        }

        let mut state = self.state();
        if options.delete {
            state.files.retain(|path, _| {
                copied.contains_key(path) || !roots.iter().any(|root| under(path, root))
            });
        }
        state.files.extend(copied);
        state
            .synced
            .push((local_paths.to_vec(), remote_dir.to_string()));
        Ok(())
    }

    fn exists(&self, remote: &str) -> Result<bool> {
        self.check_reachable(remote)?;
        Ok(self.state().files.keys().any(|path| under(path, remote)))
    }

    fn read_file(&self, remote: &str) -> Result<String> {
        self.check_reachable(remote)?;
        self.state()
            .files
            .get(remote)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .ok_or_else(|| Error::NotFound {
                host: self.host.clone(),
                message: remote.to_string(),
            })
    }

    fn remove(&self, remote: &str, recursive: bool) -> Result<()> {
        self.check_reachable(remote)?;
        let mut state = self.state();
        state.commands.push(format!(
            "rm {} {remote}",
            if recursive { "-rf" } else { "-f" }
        ));
        if recursive {
            state.files.retain(|path, _| !under(path, remote));
        } else {
            state.files.remove(remote);
        }
        Ok(())
    }

    fn own_by_root(&self, remote: &str, mode: &str) -> Result<()> {
        self.check_reachable(remote)?;
        self.state()
            .commands
            .push(format!("chown root {remote} && chmod {mode} {remote}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scripted_responses() {
        let t = MemoryTransport::new("web1");
        t.respond("ohai", CommandOutput::ok("[\"10.0.0.5\"]"));

        assert_eq!(t.execute("ohai -l warn ipaddress", true).unwrap().stdout, "[\"10.0.0.5\"]");
        assert!(t.execute("uptime", false).unwrap().success());
        assert_eq!(t.commands().len(), 2);
    }

    #[test]
    fn test_unreachable_pattern() {
        let t = MemoryTransport::new("web1");
        t.unreachable_on("mkdir");
        let err = t.execute("mkdir -p /tmp/x", true).unwrap_err();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_write_read_remove() {
        let t = MemoryTransport::new("web1");
        t.write_file("/etc/chef/lockfile", b"{}", true).unwrap();
        assert!(t.exists("/etc/chef/lockfile").unwrap());
        assert_eq!(t.read_file("/etc/chef/lockfile").unwrap(), "{}");

        t.remove("/etc/chef/lockfile", false).unwrap();
        assert!(!t.exists("/etc/chef/lockfile").unwrap());
        assert!(t.read_file("/etc/chef/lockfile").is_err());
    }

    #[test]
    fn test_mirror_sync_with_delete() {
        let dir = TempDir::new().unwrap();
        let roles = dir.path().join("roles");
        fs::create_dir_all(roles.join("nested")).unwrap();
        fs::write(roles.join("base.json"), "{}").unwrap();
        fs::write(roles.join("nested/web.json"), "{}").unwrap();

        let t = MemoryTransport::new("web1");
        t.put_file("/tmp/chef-solo/roles/old.json", "{}");
        t.put_file("/tmp/chef-solo/cache/keep", "x");

        t.mirror_sync(&[roles], "/tmp/chef-solo", &MirrorOptions::default())
            .unwrap();

        let paths = t.paths();
        assert!(paths.contains(&"/tmp/chef-solo/roles/base.json".to_string()));
        assert!(paths.contains(&"/tmp/chef-solo/roles/nested/web.json".to_string()));
        assert!(!paths.contains(&"/tmp/chef-solo/roles/old.json".to_string()));
        assert!(paths.contains(&"/tmp/chef-solo/cache/keep".to_string()));
    }

    #[test]
    fn test_recursive_remove_only_touches_subtree() {
        let t = MemoryTransport::new("web1");
        t.put_file("/w/data_bags/node/a.json", "{}");
        t.put_file("/w/data_bags/nodes_extra.json", "{}");
        t.remove("/w/data_bags/node", true).unwrap();
        assert_eq!(t.paths(), vec!["/w/data_bags/nodes_extra.json".to_string()]);
    }
}
