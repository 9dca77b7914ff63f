//! Core types for remote operations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version-control metadata never mirrored to a node.
pub const VCS_EXCLUDES: &[&str] = &["*.svn", ".bzr*", ".git*", ".hg*"];

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// A successful command that printed `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed command.
    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, as a user would have seen them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// How to reach one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Host name or address as written in the kitchen
    pub host: String,
    /// Login user; ssh's default when unset
    #[serde(default)]
    pub user: Option<String>,
    /// ssh port
    #[serde(default)]
    pub port: Option<u16>,
    /// Alternate ssh config file
    #[serde(default)]
    pub ssh_config: Option<PathBuf>,
    /// Private key
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Jump host (`user@gateway`)
    #[serde(default)]
    pub gateway: Option<String>,
}

impl Target {
    /// A target with ssh defaults for everything but the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// `user@host`, or just `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Options for mirroring local directories to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Glob patterns to leave out
    pub exclude: Vec<String>,
    /// Delete remote files that are not present locally
    pub delete: bool,
    /// Copy symlink targets instead of the links
    pub follow_symlinks: bool,
    /// Suppress transfer output
    pub quiet: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            exclude: VCS_EXCLUDES.iter().map(ToString::to_string).collect(),
            delete: true,
            follow_symlinks: false,
            quiet: true,
        }
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination() {
        let mut target = Target::new("web1.example.com");
        assert_eq!(target.destination(), "web1.example.com");
        target.user = Some("deploy".into());
        assert_eq!(target.destination(), "deploy@web1.example.com");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/chef/node.json"), "/etc/chef/node.json");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(CommandOutput::ok("out").combined(), "out");
        assert_eq!(CommandOutput::failed(1, "", "err").combined(), "err");
        assert_eq!(CommandOutput::failed(1, "out", "err").combined(), "out\nerr");
    }

    #[test]
    fn test_default_mirror_excludes_vcs() {
        let opts = MirrorOptions::default();
        assert!(opts.delete);
        assert!(opts.exclude.iter().any(|e| e == ".git*"));
    }
}
