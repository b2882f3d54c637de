// src/core/store/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{check_transition, ScanStore, StoreError, StoreResult};
use crate::core::models::{PortRecord, Scan, ScanId, ScanResults, ScanStatus, VulnerabilityRecord};

struct Entry {
    scan: Scan,
    results: ScanResults,
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<ScanId, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_results<F>(&self, scan_id: ScanId, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ScanResults),
    {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&scan_id).ok_or(StoreError::ScanNotFound(scan_id))?;
        apply(&mut entry.results);
        Ok(())
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn create_scan(&self, id: ScanId, target: &str, started_at: DateTime<Utc>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(StoreError::DuplicateScan(id));
        }
        let scan = Scan {
            id,
            target: target.to_string(),
            status: ScanStatus::InProgress,
            started_at,
            finished_at: None,
        };
        entries.insert(id, Entry { scan, results: ScanResults::default() });
        Ok(())
    }

    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(StoreError::ScanNotFound(id))?;
        check_transition(id, entry.scan.status, status)?;
        entry.scan.status = status;
        entry.scan.finished_at = finished_at;
        Ok(())
    }

    async fn append_subdomains(&self, scan_id: ScanId, hostnames: &[String]) -> StoreResult<()> {
        self.with_results(scan_id, |r| r.subdomains.extend_from_slice(hostnames)).await
    }

    async fn append_urls(&self, scan_id: ScanId, urls: &[String]) -> StoreResult<()> {
        self.with_results(scan_id, |r| r.urls.extend_from_slice(urls)).await
    }

    async fn append_ports(&self, scan_id: ScanId, records: &[PortRecord]) -> StoreResult<()> {
        self.with_results(scan_id, |r| r.ports.extend_from_slice(records)).await
    }

    async fn append_vulnerabilities(&self, scan_id: ScanId, records: &[VulnerabilityRecord]) -> StoreResult<()> {
        self.with_results(scan_id, |r| r.vulnerabilities.extend_from_slice(records)).await
    }

    async fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        Ok(self.entries.read().await.get(&id).map(|e| e.scan.clone()))
    }

    async fn get_results(&self, id: ScanId) -> StoreResult<Option<ScanResults>> {
        Ok(self.entries.read().await.get(&id).map(|e| e.results.clone()))
    }

    async fn list_scans(&self) -> StoreResult<Vec<Scan>> {
        let mut scans: Vec<Scan> = self.entries.read().await.values().map(|e| e.scan.clone()).collect();
        scans.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(scans)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn create_and_read_back() {
        contract::create_and_read_back(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_duplicate_scan() {
        contract::rejects_duplicate_scan(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn appends_accumulate_in_order() {
        contract::appends_accumulate_in_order(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_appends_for_unknown_scan() {
        contract::rejects_appends_for_unknown_scan(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn terminal_state_is_immutable() {
        contract::terminal_state_is_immutable(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn status_update_for_unknown_scan_fails() {
        contract::status_update_for_unknown_scan_fails(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn lists_newest_first() {
        contract::lists_newest_first(&MemoryStore::new()).await;
    }
}
