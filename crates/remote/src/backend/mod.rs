//! Backend abstraction for talking to a node.
//!
//! The [`Transport`] trait is the whole contract the orchestrator relies on:
//! run a command, upload a file, mirror directories, test for a path. The
//! provided methods build the rest on top of those four, and backends may
//! override them when they can do better.

pub mod memory;
pub mod ssh;

use crate::error::{Error, Result};
use crate::types::{CommandOutput, MirrorOptions, Target, shell_quote};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Backend trait for one node's remote channel.
///
/// This trait abstracts the underlying transport, enabling:
/// - Real execution over ssh and rsync
/// - An in-memory node for testing
pub trait Transport: Send + Sync {
    /// The host this transport talks to.
    fn host(&self) -> &str;

    /// Run a shell command, as root when `privileged`.
    ///
    /// A non-zero exit is not an error; only failing to run the command is.
    fn execute(&self, command: &str, privileged: bool) -> Result<CommandOutput>;

    /// Copy a local file to `remote`, as root when `privileged`.
    fn upload(&self, local: &Path, remote: &str, privileged: bool) -> Result<()>;

    /// Mirror `local_paths` into `remote_dir`.
    fn mirror_sync(
        &self,
        local_paths: &[PathBuf],
        remote_dir: &str,
        options: &MirrorOptions,
    ) -> Result<()>;

    /// Whether `remote` exists.
    fn exists(&self, remote: &str) -> Result<bool>;

    /// Run a command and fail on non-zero exit, returning stdout.
    fn run(&self, command: &str, privileged: bool) -> Result<String> {
        let output = self.execute(command, privileged)?;
        if !output.success() {
            return Err(Error::from_transport_output(
                self.host(),
                command,
                &output.combined(),
                output.exit_code,
            ));
        }
        Ok(output.stdout)
    }

    /// Read a remote file.
    fn read_file(&self, remote: &str) -> Result<String> {
        self.run(&format!("cat {}", shell_quote(remote)), true)
    }

    /// Remove a remote path. Missing paths are not an error.
    fn remove(&self, remote: &str, recursive: bool) -> Result<()> {
        let flags = if recursive { "-rf" } else { "-f" };
        self.run(&format!("rm {flags} {}", shell_quote(remote)), true)
            .map(drop)
    }

    /// Write `contents` to a remote file.
    fn write_file(&self, remote: &str, contents: &[u8], privileged: bool) -> Result<()> {
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(contents)?;
        staged.flush()?;
        self.upload(staged.path(), remote, privileged)
    }

    /// Hand a root-written file over to root's group and set its mode.
    fn own_by_root(&self, remote: &str, mode: &str) -> Result<()> {
        let path = shell_quote(remote);
        self.run(
            &format!("chown root:$(id -g -n root) {path} && chmod {mode} {path}"),
            true,
        )
        .map(drop)
    }
}

/// Opens a [`Transport`] per node.
pub trait Connector: Send + Sync {
    /// Open a channel to `target`.
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>>;
}

/// Connector producing [`ssh::SshTransport`]s.
#[derive(Debug, Default, Clone)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>> {
        Ok(Box::new(ssh::SshTransport::new(target.clone())?))
    }
}
