use anyhow::{Context, Result};
use cook::Operator;
use std::path::Path;
use std::process::Command;

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str], dir: Option<&Path>) -> Result<String> {
    let mut command = Command::new(cmd);
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let output = command
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Local user name: `$USER`, falling back to `whoami`
pub fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| run_capture("whoami", &[], None).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Current git branch of the kitchen, empty outside a repository
pub fn git_branch(kitchen: &Path) -> String {
    match run_capture("git", &["rev-parse", "--abbrev-ref", "HEAD"], Some(kitchen)) {
        Ok(branch) => branch,
        Err(e) => {
            log::debug!("No git branch for {}: {e}", kitchen.display());
            String::new()
        }
    }
}

/// Who is running sous against this kitchen
pub fn operator(kitchen: &Path) -> Operator {
    Operator {
        user: current_user(),
        branch: git_branch(kitchen),
    }
}
