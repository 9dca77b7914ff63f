//! Run records.
//!
//! One record per lock change or chef-solo run. Records are kept in two
//! indexes: a status index with the latest record per host, and a log with
//! the most recent records first.

use crate::context::{Operator, RunContext};
use chrono::{DateTime, Utc};
use kitchen::Node;
use serde::{Deserialize, Serialize};

/// Most records kept in the run log.
pub const LOG_CAPACITY: usize = 500;

/// Outcome stored in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run or lock change succeeded
    Successful,
    /// Run failed
    Failed,
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Node name
    #[serde(rename = "HOST")]
    pub host: String,
    /// Kitchen branch that was deployed
    #[serde(rename = "BRANCH")]
    pub branch: String,
    /// Operator
    #[serde(rename = "USER")]
    pub user: String,
    /// UTC time, minute precision
    #[serde(rename = "TIME")]
    pub time: String,
    /// Outcome
    #[serde(rename = "CSTATUS")]
    pub status: RunStatus,
    /// Node environment
    #[serde(rename = "ENV")]
    pub env: String,
    /// Lock reason when locking, empty otherwise
    #[serde(rename = "LOCK")]
    pub lock: String,
}

impl RunRecord {
    /// A record for `node` stamped with the current time.
    pub fn new(node: &Node, operator: &Operator, status: RunStatus, lock: impl Into<String>) -> Self {
        Self::at(node, operator, status, lock, Utc::now())
    }

    /// A record for `node` stamped with `time`.
    pub fn at(
        node: &Node,
        operator: &Operator,
        status: RunStatus,
        lock: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            host: node.name.clone(),
            branch: operator.branch.clone(),
            user: operator.user.clone(),
            time: time.format("%Y-%m-%d %H:%M").to_string(),
            status,
            env: node.chef_environment.clone(),
            lock: lock.into(),
        }
    }

    /// The one-line notification for this record.
    pub fn notification(&self) -> String {
        match self.status {
            RunStatus::Successful => format!(
                "{} successfully deployed [{}] to *{}*.",
                self.user, self.branch, self.host
            ),
            RunStatus::Failed => format!(
                "{} failed to deploy [{}] to *{}*.",
                self.user, self.branch, self.host
            ),
        }
    }
}

/// Replace the host's entry in the status index, or add it. Keeps the index
/// sorted by host.
pub fn update_status(index: &mut Vec<RunRecord>, record: RunRecord) {
    match index.iter_mut().find(|r| r.host == record.host) {
        Some(existing) => *existing = record,
        None => index.insert(0, record),
    }
    index.sort_by(|a, b| a.host.cmp(&b.host));
}

/// Put `record` at the head of the log, dropping the oldest entries beyond
/// [`LOG_CAPACITY`].
pub fn append_log(log: &mut Vec<RunRecord>, record: RunRecord) {
    log.insert(0, record);
    log.truncate(LOG_CAPACITY);
}

/// Hand a record to the audit sink and notifier.
///
/// Neither is allowed to change a run's outcome, so failures are logged and
/// dropped.
pub fn report(ctx: &RunContext<'_>, record: &RunRecord) {
    if let Err(e) = ctx.audit.record(record) {
        log::warn!("[{}] could not store run record: {e}", record.host);
    }
    if let Err(e) = ctx.notifier.notify(&record.notification()) {
        log::warn!("[{}] could not send notification: {e}", record.host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn operator() -> Operator {
        Operator {
            user: "alice".into(),
            branch: "main".into(),
        }
    }

    fn record(host: &str, status: RunStatus) -> RunRecord {
        RunRecord::at(
            &Node::new(host),
            &operator(),
            status,
            "",
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 59).unwrap(),
        )
    }

    #[test]
    fn test_record_serializes_with_upper_case_keys() {
        let json = serde_json::to_value(record("web1", RunStatus::Successful)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "HOST": "web1",
                "BRANCH": "main",
                "USER": "alice",
                "TIME": "2024-03-01 09:05",
                "CSTATUS": "successful",
                "ENV": "_default",
                "LOCK": ""
            })
        );
    }

    #[test]
    fn test_notification_text() {
        assert_eq!(
            record("web1", RunStatus::Successful).notification(),
            "alice successfully deployed [main] to *web1*."
        );
        assert_eq!(
            record("web1", RunStatus::Failed).notification(),
            "alice failed to deploy [main] to *web1*."
        );
    }

    #[test]
    fn test_update_status_upserts_and_sorts() {
        let mut index = vec![record("db1", RunStatus::Successful)];
        update_status(&mut index, record("web1", RunStatus::Successful));
        update_status(&mut index, record("app1", RunStatus::Successful));
        update_status(&mut index, record("web1", RunStatus::Failed));

        let hosts: Vec<_> = index.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, ["app1", "db1", "web1"]);
        assert_eq!(index[2].status, RunStatus::Failed);
    }

    #[test]
    fn test_append_log_caps_history() {
        let mut log = Vec::new();
        for i in 0..LOG_CAPACITY + 3 {
            append_log(&mut log, record(&format!("n{i}"), RunStatus::Successful));
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log[0].host, format!("n{}", LOG_CAPACITY + 2));
    }
}
