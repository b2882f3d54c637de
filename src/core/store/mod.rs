// src/core/store/mod.rs

//! Persistence gateway for scans and their findings.
//!
//! The pipeline is the only writer of status and findings; the operator
//! console only reads. Appends are scoped to one scan and one finding type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::models::{PortRecord, Scan, ScanId, ScanResults, ScanStatus, VulnerabilityRecord};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scan {0} not found")]
    ScanNotFound(ScanId),

    #[error("scan {0} already exists")]
    DuplicateScan(ScanId),

    #[error("scan {id} is already {status}; refusing transition to {requested}")]
    AlreadyTerminal {
        id: ScanId,
        status: ScanStatus,
        requested: ScanStatus,
    },

    #[error("scan {0} was modified concurrently")]
    Conflict(ScanId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn create_scan(&self, id: ScanId, target: &str, started_at: DateTime<Utc>) -> StoreResult<()>;

    /// Moves a scan to `status`. A scan that is already terminal is never
    /// touched again: the call fails with [`StoreError::AlreadyTerminal`] and
    /// `finished_at` keeps its first value.
    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn append_subdomains(&self, scan_id: ScanId, hostnames: &[String]) -> StoreResult<()>;

    async fn append_urls(&self, scan_id: ScanId, urls: &[String]) -> StoreResult<()>;

    async fn append_ports(&self, scan_id: ScanId, records: &[PortRecord]) -> StoreResult<()>;

    async fn append_vulnerabilities(&self, scan_id: ScanId, records: &[VulnerabilityRecord]) -> StoreResult<()>;

    async fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>>;

    async fn get_results(&self, id: ScanId) -> StoreResult<Option<ScanResults>>;

    /// All scans, newest first.
    async fn list_scans(&self) -> StoreResult<Vec<Scan>>;
}

/// Shared checks every backend runs against the current status before a transition.
pub(crate) fn check_transition(id: ScanId, current: ScanStatus, requested: ScanStatus) -> StoreResult<()> {
    if current.is_terminal() {
        return Err(StoreError::AlreadyTerminal { id, status: current, requested });
    }
    Ok(())
}
