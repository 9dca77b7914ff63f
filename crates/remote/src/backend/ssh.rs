//! ssh/rsync backend.
//!
//! Shells out to the system `ssh` and `rsync`, so `~/.ssh/config`, agents
//! and jump hosts all work as they do interactively. Privileged commands go
//! through `sudo -n`; the deployment user needs passwordless sudo.

use super::Transport;
use crate::error::{Error, Result};
use crate::types::{CommandOutput, MirrorOptions, Target, shell_quote};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Transport backed by the `ssh` and `rsync` executables.
#[derive(Debug, Clone)]
pub struct SshTransport {
    target: Target,
    ssh: PathBuf,
}

impl SshTransport {
    /// Create a transport for `target`, checking that `ssh` is installed.
    pub fn new(target: Target) -> Result<Self> {
        let ssh = which::which("ssh").map_err(|_| Error::ToolMissing("ssh".to_string()))?;
        Ok(Self { target, ssh })
    }

    /// The target this transport connects to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// ssh options shared by every connection, without the destination.
    fn ssh_options(&self) -> Vec<String> {
        let mut opts = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = self.target.port {
            opts.push("-p".to_string());
            opts.push(port.to_string());
        }
        if let Some(config) = &self.target.ssh_config {
            opts.push("-F".to_string());
            opts.push(config.display().to_string());
        }
        if let Some(identity) = &self.target.identity_file {
            opts.push("-i".to_string());
            opts.push(identity.display().to_string());
        }
        if let Some(gateway) = &self.target.gateway {
            opts.push("-J".to_string());
            opts.push(gateway.clone());
        }
        opts
    }

    fn remote_command(command: &str, privileged: bool) -> String {
        if privileged {
            format!("sudo -n sh -c {}", shell_quote(command))
        } else {
            command.to_string()
        }
    }

    fn ssh_command(&self, remote: &str) -> Command {
        let mut cmd = Command::new(&self.ssh);
        cmd.args(self.ssh_options())
            .arg(self.target.destination())
            .arg(remote);
        cmd
    }

    fn check(&self, command: &str, output: &Output) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        Err(Error::from_transport_output(
            self.host(),
            command,
            &String::from_utf8_lossy(&output.stderr),
            output.status.code(),
        ))
    }
}

impl Transport for SshTransport {
    fn host(&self) -> &str {
        &self.target.host
    }

    fn execute(&self, command: &str, privileged: bool) -> Result<CommandOutput> {
        log::debug!("[{}] run: {command}", self.host());
        let output = self
            .ssh_command(&Self::remote_command(command, privileged))
            .stdin(Stdio::null())
            .output()?;

        let code = output.status.code();
        if code == Some(255) {
            // 255 is ssh itself failing, not the remote command
            return Err(Error::from_transport_output(
                self.host(),
                command,
                &String::from_utf8_lossy(&output.stderr),
                code,
            ));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: code,
        })
    }

    fn upload(&self, local: &Path, remote: &str, privileged: bool) -> Result<()> {
        log::debug!("[{}] put: {} -> {remote}", self.host(), local.display());
        let tee = format!("tee {} > /dev/null", shell_quote(remote));
        let command = Self::remote_command(&tee, privileged);

        let output = self
            .ssh_command(&command)
            .stdin(File::open(local)?)
            .output()?;
        self.check(&command, &output)
    }

    fn mirror_sync(
        &self,
        local_paths: &[PathBuf],
        remote_dir: &str,
        options: &MirrorOptions,
    ) -> Result<()> {
        let rsync = which::which("rsync").map_err(|_| Error::ToolMissing("rsync".to_string()))?;

        let mut cmd = Command::new(rsync);
        cmd.arg("-rlpt").arg("--compress");
        if options.quiet {
            cmd.arg("-q");
        }
        if options.delete {
            cmd.arg("--delete");
        }
        if options.follow_symlinks {
            cmd.arg("--copy-links");
        }
        for pattern in &options.exclude {
            cmd.arg("--exclude").arg(pattern);
        }

        let ssh = std::iter::once(self.ssh.display().to_string())
            .chain(self.ssh_options().iter().map(|o| shell_quote(o)))
            .collect::<Vec<_>>()
            .join(" ");
        cmd.arg("-e").arg(ssh);
        cmd.args(local_paths);
        cmd.arg(format!("{}:{remote_dir}", self.target.destination()));

        log::debug!("[{}] rsync {:?} -> {remote_dir}", self.host(), local_paths);
        let output = cmd.stdin(Stdio::null()).output()?;
        self.check("rsync", &output)
    }

    fn exists(&self, remote: &str) -> Result<bool> {
        let output = self.execute(&format!("test -e {}", shell_quote(remote)), true)?;
        Ok(output.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(target: Target) -> SshTransport {
        SshTransport {
            target,
            ssh: PathBuf::from("/usr/bin/ssh"),
        }
    }

    #[test]
    fn test_privileged_commands_go_through_sudo() {
        assert_eq!(
            SshTransport::remote_command("rm -f /etc/chef/node.json", true),
            "sudo -n sh -c 'rm -f /etc/chef/node.json'"
        );
        assert_eq!(SshTransport::remote_command("uptime", false), "uptime");
    }

    #[test]
    fn test_ssh_options() {
        let t = transport(Target {
            host: "web1".into(),
            user: Some("deploy".into()),
            port: Some(2222),
            ssh_config: Some(PathBuf::from("/tmp/ssh_config")),
            identity_file: None,
            gateway: Some("jump@bastion".into()),
        });
        assert_eq!(
            t.ssh_options(),
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-F",
                "/tmp/ssh_config",
                "-J",
                "jump@bastion"
            ]
        );
    }
}
