// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Opaque identity of a scan.
pub type ScanId = Uuid;

// --- Scan Lifecycle ---

/// Lifecycle state of a scan. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// One end-to-end pipeline run against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub target: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Scan {
    /// A freshly requested scan, `in_progress` from the moment it exists.
    pub fn new(target: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.to_string(),
            status: ScanStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

// --- Finding Records ---
// Subdomains and URLs are persisted as plain strings keyed by scan id.

/// An open port reported by the port scanning stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub ip: String,
    pub port: u16,
}

/// A template match reported by the vulnerability stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub template_id: String,
    /// Free-form, as the tool reports it (`critical`, `high`, ..., `unknown`).
    pub severity: String,
    pub matched_url: String,
    pub description: String,
}

/// Everything persisted for one scan, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub subdomains: Vec<String>,
    pub urls: Vec<String>,
    pub ports: Vec<PortRecord>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

impl ScanResults {
    pub fn total(&self) -> usize {
        self.subdomains.len() + self.urls.len() + self.ports.len() + self.vulnerabilities.len()
    }

    /// Vulnerability count for a severity label, compared case-insensitively.
    pub fn severity_count(&self, severity: &str) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity.eq_ignore_ascii_case(severity))
            .count()
    }
}

// --- Pipeline Messages ---

/// The pipeline-invocation message handed to the job dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub scan_id: ScanId,
    pub target: String,
    pub template_filters: Vec<String>,
}

/// Accumulated output of the stages that have run so far.
///
/// Each stage returns the prior result with its own field filled in, so a
/// later stage reads exactly what earlier stages discovered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageResult {
    pub subdomains: Vec<String>,
    pub urls: Vec<String>,
    pub ports: Vec<PortRecord>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}
