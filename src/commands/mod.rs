pub mod agent;
pub mod fleet;
pub mod lock;
pub mod nodes;

use crate::Context;
use crate::audit::{FileAuditSink, LogNotifier};
use crate::config::SousConfig;
use crate::{paths, runner};
use anyhow::{Context as _, Result};
use cook::{Operator, RunContext, RunSettings};
use kitchen::{Catalog, KitchenLayout, Node};
use remote::{Connector, SshConnector, Transport};
use std::path::PathBuf;

/// The kitchen a command works on, with everything loaded from it.
pub struct Kitchen {
    pub root: PathBuf,
    pub config: SousConfig,
    pub layout: KitchenLayout,
    pub operator: Operator,
    pub audit: FileAuditSink,
    pub notifier: LogNotifier,
}

impl Kitchen {
    pub fn open(ctx: &Context) -> Result<Self> {
        let root = paths::kitchen_root(ctx.kitchen.as_deref())?;
        if !root.is_dir() {
            anyhow::bail!("Kitchen directory not found: {}", root.display());
        }
        let config = SousConfig::load(&root)?;
        let layout = config.layout(&root);
        let operator = runner::operator(&root);
        let audit = FileAuditSink::new(config.audit_dir(&root));
        log::debug!(
            "Kitchen {} (operator {}, branch {:?})",
            root.display(),
            operator.user,
            operator.branch
        );

        Ok(Self {
            root,
            config,
            layout,
            operator,
            audit,
            notifier: LogNotifier,
        })
    }

    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::load(&self.layout)
            .with_context(|| format!("Could not load kitchen at {}", self.root.display()))
    }

    pub fn settings(&self, why_run: bool, force_save: bool) -> RunSettings {
        self.config.run_settings(&self.root, why_run, force_save)
    }

    pub fn run_context<'a>(&'a self, settings: &'a RunSettings) -> RunContext<'a> {
        RunContext {
            layout: &self.layout,
            settings,
            operator: &self.operator,
            audit: &self.audit,
            notifier: &self.notifier,
        }
    }

    /// Open an ssh transport to a node.
    pub fn connect(&self, node: &Node) -> Result<Box<dyn Transport>> {
        let target = remote::Target {
            host: node.name.clone(),
            ..self.config.target_template()
        };
        SshConnector
            .connect(&target)
            .with_context(|| format!("Could not connect to {}", node.name))
    }
}
