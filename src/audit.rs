//! Local audit sink and notifier.
//!
//! Records land in two JSON files under the audit directory: `status.json`
//! with the latest record per host and `log.json` with the run history,
//! newest first.

use cook::record::{append_log, update_status};
use cook::{AuditSink, Notifier, RunRecord};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const STATUS_FILE: &str = "status.json";
pub const LOG_FILE: &str = "log.json";

/// Audit sink backed by files in a local directory.
///
/// Writes from parallel node runs are serialized through a mutex.
pub struct FileAuditSink {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn status(&self) -> cook::Result<Vec<RunRecord>> {
        read_or_default(&self.dir.join(STATUS_FILE))
    }

    pub fn history(&self) -> cook::Result<Vec<RunRecord>> {
        read_or_default(&self.dir.join(LOG_FILE))
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &RunRecord) -> cook::Result<()> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::fs::create_dir_all(&self.dir)?;

        let mut status = self.status()?;
        update_status(&mut status, record.clone());
        write_json(&self.dir.join(STATUS_FILE), &status)?;

        let mut log = self.history()?;
        append_log(&mut log, record.clone());
        write_json(&self.dir.join(LOG_FILE), &log)?;

        log::debug!("Recorded {} for {}", LOG_FILE, record.host);
        Ok(())
    }
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> cook::Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn write_json(path: &Path, records: &[RunRecord]) -> cook::Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Notifier that writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) -> cook::Result<()> {
        log::info!("{message}");
        Ok(())
    }
}
