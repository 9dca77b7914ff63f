//! Path resolution for sous
//!
//! # Environment Variables
//!
//! - `SOUS_KITCHEN` - Kitchen directory used when `--kitchen` is not given
//!
//! # Kitchen Resolution Priority
//!
//! 1. `--kitchen` flag
//! 2. `SOUS_KITCHEN` environment variable
//! 3. Current directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the kitchen directory
pub const ENV_KITCHEN: &str = "SOUS_KITCHEN";

/// Name of the kitchen configuration file
pub const CONFIG_FILE: &str = "sous.toml";

/// Resolve the kitchen root directory.
pub fn kitchen_root(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        let path = expand(&dir.to_string_lossy());
        log::debug!("Using kitchen from --kitchen: {}", path.display());
        return Ok(path);
    }

    if let Ok(dir) = std::env::var(ENV_KITCHEN) {
        let path = expand(&dir);
        log::debug!("Using kitchen from {}: {}", ENV_KITCHEN, path.display());
        return Ok(path);
    }

    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    log::debug!("Using kitchen in current directory: {}", cwd.display());
    Ok(cwd)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve a configured path against the kitchen root.
///
/// Absolute and `~` paths are kept; relative paths are taken from the
/// kitchen root.
pub fn resolve(kitchen: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        kitchen.join(expanded)
    }
}

// ============================================================================
// Tests
// ============================================================================
