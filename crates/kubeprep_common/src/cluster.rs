//! Reports produced by the cluster reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one pre-apply cleanup pass.
///
/// Every field is best-effort: individual failures land in `warnings` and
/// never abort the pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Exam releases uninstalled normally.
    pub releases_removed: Vec<String>,
    /// Stuck releases cleared by deleting their release metadata directly.
    pub stuck_cleared: Vec<String>,
    /// Namespaces actually deleted (pre-existing ones only).
    pub namespaces_deleted: Vec<String>,
    /// Sub-step failures that were tolerated.
    pub warnings: Vec<String>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.releases_removed.is_empty()
            && self.stuck_cleared.is_empty()
            && self.namespaces_deleted.is_empty()
            && self.warnings.is_empty()
    }
}

/// Current state of an exam release on the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseStatus {
    /// True when the release exists and is deployed.
    pub applied: bool,
    pub release: String,
    pub namespace: String,
    /// Raw status string from the package manager, or "not-installed".
    pub status: String,
}

impl ReleaseStatus {
    pub fn not_installed(release: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            applied: false,
            release: release.into(),
            namespace: namespace.into(),
            status: "not-installed".to_string(),
        }
    }
}

/// Terminal result of one apply request. Not persisted beyond the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub succeeded: bool,
    pub release: String,
    pub namespace: String,
    /// When the apply request started.
    pub executed_at: DateTime<Utc>,
    /// Full captured stdout of the apply step.
    pub stdout: String,
    /// Full captured stderr of the apply step.
    pub stderr: String,
    /// Human-readable failure description, when `succeeded` is false.
    pub error: Option<String>,
    /// Pod counts per themed namespace observed during verification.
    pub pods_seen: BTreeMap<String, u32>,
}

impl ApplyOutcome {
    pub fn new(release: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            release: release.into(),
            namespace: namespace.into(),
            executed_at: Utc::now(),
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            pods_seen: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_report_is_empty() {
        assert!(CleanupReport::default().is_empty());
    }

    #[test]
    fn warnings_make_report_non_empty() {
        let report = CleanupReport {
            warnings: vec!["uninstall failed".into()],
            ..Default::default()
        };
        assert!(!report.is_empty());
    }
}
