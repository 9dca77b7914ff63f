//! Shared fixtures for unit tests.

use crate::context::{AuditSink, Notifier, Operator, RunContext, RunSettings};
use crate::error::Result;
use crate::record::RunRecord;
use kitchen::{Catalog, KitchenLayout, Node};
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

/// Output of a chef-solo run that completed.
pub const CHEF_OK: &str = "Starting Chef Client\n\
    Converging 3 resources\n\
    Chef Run complete in 4.2 seconds\n\
    Running handlers complete\n";

/// Audit sink and notifier that keep everything in memory.
#[derive(Default)]
pub struct Recorder {
    records: Mutex<Vec<RunRecord>>,
    messages: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AuditSink for Recorder {
    fn record(&self, record: &RunRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl Notifier for Recorder {
    fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// A temporary kitchen plus everything a [`RunContext`] borrows.
pub struct Harness {
    pub dir: TempDir,
    pub layout: KitchenLayout,
    pub settings: RunSettings,
    pub operator: Operator,
    pub audit: Recorder,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = KitchenLayout::new(dir.path());
        Self {
            dir,
            layout,
            settings: RunSettings::default(),
            operator: Operator {
                user: "alice".into(),
                branch: "main".into(),
            },
            audit: Recorder::default(),
        }
    }

    pub fn ctx(&self) -> RunContext<'_> {
        RunContext {
            layout: &self.layout,
            settings: &self.settings,
            operator: &self.operator,
            audit: &self.audit,
            notifier: &self.audit,
        }
    }

    /// Write a kitchen holding `nodes`, a `base` role and an `app` cookbook,
    /// and build its node data bag.
    pub fn write_kitchen(&self, nodes: &[Node]) -> Catalog {
        let root = &self.layout.root;
        fs::create_dir_all(root.join("roles")).unwrap();
        fs::create_dir_all(root.join("environments")).unwrap();
        fs::create_dir_all(root.join("site-cookbooks/app")).unwrap();

        fs::write(
            root.join("roles/base.json"),
            r#"{"name": "base", "default_attributes": {"timeout": 10}, "run_list": ["recipe[app]"]}"#,
        )
        .unwrap();
        fs::write(
            root.join("site-cookbooks/app/metadata.json"),
            r#"{"name": "app", "attributes": {"timeout": {"default": 5}}}"#,
        )
        .unwrap();
        for node in nodes {
            kitchen::catalog::save_node(&self.layout, node, true).unwrap();
        }

        let catalog = Catalog::load(&self.layout).unwrap();
        kitchen::materialize(&self.layout, &catalog).unwrap();
        catalog
    }
}
