//! Kitchen configuration (`sous.toml`).
//!
//! Every section is optional; a kitchen without the file runs on defaults.

use crate::paths;
use anyhow::{Context, Result};
use cook::{PackageSync, Proxies, RunSettings};
use kitchen::KitchenLayout;
use remote::Target;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The sous configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SousConfig {
    /// How to reach nodes
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Kitchen layout and extras pushed to nodes
    #[serde(default)]
    pub kitchen: KitchenConfig,

    /// chef-solo settings
    #[serde(default)]
    pub chef: ChefConfig,

    /// Extra package directory mirrored to every node
    #[serde(default)]
    pub sync_packages: SyncPackagesConfig,

    /// Fleet run settings
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_config: Option<String>,
    pub identity_file: Option<String>,
    pub gateway: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenConfig {
    #[serde(default = "default_node_work_path")]
    pub node_work_path: String,
    #[serde(default = "default_cookbook_paths")]
    pub cookbook_paths: Vec<String>,
    #[serde(default)]
    pub encrypted_data_bag_secret: Option<String>,
    #[serde(default)]
    pub vendored_cookbooks: Option<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            node_work_path: default_node_work_path(),
            cookbook_paths: default_cookbook_paths(),
            encrypted_data_bag_secret: None,
            vendored_cookbooks: None,
            follow_symlinks: false,
        }
    }
}

fn default_node_work_path() -> String {
    cook::context::DEFAULT_NODE_WORK_PATH.to_string()
}

fn default_cookbook_paths() -> Vec<String> {
    kitchen::catalog::DEFAULT_COOKBOOK_PATHS
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChefConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub enable_logs: bool,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Chef version installed by `deploy-agent`
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ChefConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            formatter: None,
            verbose: false,
            enable_logs: true,
            log_file: default_log_file(),
            version: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    cook::context::DEFAULT_LOG_FILE.to_string()
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPackagesConfig {
    pub local_dir: Option<String>,
    pub dest_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Where run records are kept (default `<kitchen>/.sous`)
    #[serde(default)]
    pub audit_dir: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            audit_dir: None,
        }
    }
}

const fn default_jobs() -> usize {
    cook::DEFAULT_JOBS
}

impl SousConfig {
    /// Load `sous.toml` from the kitchen root, or defaults when absent.
    pub fn load(kitchen: &Path) -> Result<Self> {
        let path = kitchen.join(paths::CONFIG_FILE);
        if !path.exists() {
            log::debug!("No {} in {}, using defaults", paths::CONFIG_FILE, kitchen.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Kitchen layout with the configured cookbook paths.
    pub fn layout(&self, kitchen: &Path) -> KitchenLayout {
        KitchenLayout::new(kitchen).with_cookbook_paths(self.kitchen.cookbook_paths.clone())
    }

    /// Connection settings shared by every node; the host is filled in per node.
    pub fn target_template(&self) -> Target {
        let c = &self.connection;
        Target {
            host: String::new(),
            user: c.user.clone(),
            port: c.port,
            ssh_config: c.ssh_config.as_deref().map(paths::expand),
            identity_file: c.identity_file.as_deref().map(paths::expand),
            gateway: c.gateway.clone(),
        }
    }

    /// chef-solo settings for a run.
    pub fn run_settings(&self, kitchen: &Path, why_run: bool, force_save: bool) -> RunSettings {
        let sync_packages = match (&self.sync_packages.local_dir, &self.sync_packages.dest_dir) {
            (Some(local), Some(dest)) => Some(PackageSync {
                local_dir: paths::resolve(kitchen, local),
                dest_dir: dest.clone(),
            }),
            _ => None,
        };

        RunSettings {
            node_work_path: self.kitchen.node_work_path.clone(),
            remote_user: self.connection.user.clone(),
            log_level: self.chef.log_level.clone(),
            formatter: self.chef.formatter.clone(),
            verbose: self.chef.verbose,
            enable_logs: self.chef.enable_logs,
            log_file: self.chef.log_file.clone(),
            why_run,
            force_save,
            encrypted_data_bag_secret: self
                .kitchen
                .encrypted_data_bag_secret
                .as_deref()
                .map(|p| paths::resolve(kitchen, p)),
            vendored_cookbooks: self
                .kitchen
                .vendored_cookbooks
                .as_deref()
                .map(|p| paths::resolve(kitchen, p)),
            follow_symlinks: self.kitchen.follow_symlinks,
            proxies: Proxies {
                http: self.connection.http_proxy.clone(),
                https: self.connection.https_proxy.clone(),
                no_proxy: self.connection.no_proxy.clone(),
            },
            sync_packages,
        }
    }

    /// Directory holding `status.json` and `log.json`.
    pub fn audit_dir(&self, kitchen: &Path) -> PathBuf {
        self.run
            .audit_dir
            .as_deref()
            .map_or_else(|| kitchen.join(".sous"), |p| paths::resolve(kitchen, p))
    }
}
