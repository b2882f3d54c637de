// src/core/service.rs

//! Entry points an operator surface calls: start a scan, then poll its
//! status and findings.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::core::dispatch::{DeadLetter, DispatchError, JobDispatcher};
use crate::core::models::{Scan, ScanId, ScanJob, ScanResults, ScanStatus};
use crate::core::store::{ScanStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scan {0} was recorded but could not be queued")]
    NotQueued(ScanId, #[source] DispatchError),
}

pub struct ScanService {
    store: Arc<dyn ScanStore>,
    dispatcher: JobDispatcher,
}

impl ScanService {
    pub fn new(store: Arc<dyn ScanStore>, dispatcher: JobDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Records a new `in_progress` scan and queues its pipeline run.
    ///
    /// The scan row exists before the job is queued, so a worker never sees
    /// a job for a scan it can't load. If queuing fails the scan is marked
    /// `failed` rather than left in progress forever.
    pub async fn create_scan(&self, target: &str, template_filters: Vec<String>) -> Result<ScanId, ServiceError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ServiceError::EmptyTarget);
        }

        let scan = Scan::new(target);
        self.store.create_scan(scan.id, &scan.target, scan.started_at).await?;
        info!(scan_id = %scan.id, target = %scan.target, templates = ?template_filters, "Scan created.");

        let job = ScanJob { scan_id: scan.id, target: scan.target, template_filters };
        if let Err(e) = self.dispatcher.enqueue(job).await {
            error!(scan_id = %scan.id, error = %e, "Could not queue scan.");
            let _ = self
                .store
                .update_scan_status(scan.id, ScanStatus::Failed, Some(chrono::Utc::now()))
                .await;
            return Err(ServiceError::NotQueued(scan.id, e));
        }
        Ok(scan.id)
    }

    pub async fn scan_status(&self, scan_id: ScanId) -> Result<Option<Scan>, ServiceError> {
        Ok(self.store.get_scan(scan_id).await?)
    }

    /// Findings recorded so far; partial while the scan is in progress.
    pub async fn scan_results(&self, scan_id: ScanId) -> Result<Option<ScanResults>, ServiceError> {
        Ok(self.store.get_results(scan_id).await?)
    }

    /// Newest first.
    pub async fn list_scans(&self) -> Result<Vec<Scan>, ServiceError> {
        Ok(self.store.list_scans().await?)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dispatcher.dead_letters().await
    }

    /// Drains queued work and stops the workers.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}
