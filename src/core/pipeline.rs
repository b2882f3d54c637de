// src/core/pipeline.rs

//! Runs the four stages of one scan in order and owns the scan's single
//! terminal status transition.
//!
//! The chain is strict: each stage reads what the earlier ones discovered, so
//! nothing runs concurrently within a scan. The first failing stage stops the
//! chain; findings already persisted by earlier stages stay where they are.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ToolPaths;
use crate::core::models::{ScanId, ScanJob, ScanStatus, StageResult};
use crate::core::stages::{Stage, StageContext, StageFailure};
use crate::core::store::{ScanStore, StoreError};
use crate::core::tool::ToolRunner;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("scan {0} does not exist")]
    ScanNotFound(ScanId),

    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error("could not record scan outcome: {0}")]
    Persistence(#[from] StoreError),
}

/// What happened to a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(StageResult),
    /// The scan was already terminal, e.g. a redelivered job. Nothing ran.
    Skipped(ScanStatus),
}

pub struct Pipeline {
    ctx: StageContext,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ScanStore>,
        runner: Arc<dyn ToolRunner>,
        tools: ToolPaths,
        stage_timeout: Option<Duration>,
    ) -> Self {
        Self {
            ctx: StageContext { store, runner, tools, timeout: stage_timeout },
        }
    }

    /// Executes the whole chain for an already-created scan.
    pub async fn submit(&self, job: &ScanJob) -> Result<Outcome, PipelineError> {
        let scan = self
            .ctx
            .store
            .get_scan(job.scan_id)
            .await?
            .ok_or(PipelineError::ScanNotFound(job.scan_id))?;

        if scan.status.is_terminal() {
            warn!(scan_id = %job.scan_id, status = %scan.status, "Scan already finished, skipping job.");
            return Ok(Outcome::Skipped(scan.status));
        }

        info!(scan_id = %job.scan_id, target = %job.target, "Pipeline started.");
        let mut result = StageResult::default();

        for stage in Stage::iter() {
            info!(scan_id = %job.scan_id, stage = %stage, "Stage started.");
            match stage.run(&self.ctx, job, result).await {
                Ok(next) => result = next,
                Err(cause) => {
                    let failure = StageFailure { stage, cause };
                    error!(scan_id = %job.scan_id, error = %failure, "Stage failed, aborting pipeline.");
                    // A failed transition is already logged; the stage error is what the caller needs.
                    let _ = self.finish(job.scan_id, ScanStatus::Failed).await;
                    return Err(failure.into());
                }
            }
        }

        if let Err(e) = self.finish(job.scan_id, ScanStatus::Completed).await {
            // Leave the scan terminal if at all possible.
            if let Err(inner) = self.finish(job.scan_id, ScanStatus::Failed).await {
                warn!(scan_id = %job.scan_id, error = %inner, "Could not mark scan failed either.");
            }
            return Err(e.into());
        }

        info!(
            scan_id = %job.scan_id,
            subdomains = result.subdomains.len(),
            urls = result.urls.len(),
            ports = result.ports.len(),
            vulnerabilities = result.vulnerabilities.len(),
            "Pipeline completed."
        );
        Ok(Outcome::Completed(result))
    }

    /// Marks a scan `failed` when its run ended outside `submit`'s control,
    /// e.g. the task running it panicked.
    pub async fn mark_failed(&self, scan_id: ScanId) -> Result<(), StoreError> {
        self.finish(scan_id, ScanStatus::Failed).await
    }

    async fn finish(&self, scan_id: ScanId, status: ScanStatus) -> Result<(), StoreError> {
        let outcome = self.ctx.store.update_scan_status(scan_id, status, Some(Utc::now())).await;
        if let Err(e) = &outcome {
            error!(scan_id = %scan_id, status = %status, error = %e, "Status transition failed.");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{PortRecord, Scan};
    use crate::core::stages::StageError;
    use crate::core::stages::testing::{ScriptedRunner, job};
    use crate::core::store::MemoryStore;

    const SUBFINDER: &[&str] = &[r#"{"host":"api.example.com"}"#, r#"{"host":"example.com"}"#];
    const KATANA: &[&str] = &[r#"{"url":"https://example.com/"}"#, "not json", r#"{"url":"https://example.com/login"}"#];
    const NAABU: &[&str] = &[r#"{"host":"api.example.com","ip":"93.184.216.34","port":443}"#];
    const NUCLEI: &[&str] = &[
        r#"{"templateID":"http-missing-security-headers","info":{"name":"HTTP Missing Security Headers","severity":"info"},"matched":"https://api.example.com"}"#,
    ];

    fn pipeline(runner: Arc<ScriptedRunner>) -> (Pipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone(), runner, ToolPaths::default(), None);
        (pipeline, store)
    }

    fn happy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .stdout("subfinder", SUBFINDER)
            .stdout("katana", KATANA)
            .stdout("naabu", NAABU)
            .stdout("nuclei", NUCLEI)
    }

    #[tokio::test]
    async fn all_stages_succeed_and_scan_completes() {
        let runner = Arc::new(happy_runner());
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "example.com", &["cves"]).await;

        let outcome = pipeline.submit(&job).await.unwrap();

        let Outcome::Completed(result) = outcome else { panic!("expected completion") };
        assert_eq!(result.subdomains.len(), 2);
        assert_eq!(result.urls.len(), 2);
        assert_eq!(result.ports, vec![PortRecord { ip: "93.184.216.34".into(), port: 443 }]);
        assert_eq!(result.vulnerabilities.len(), 1);

        let scan = store.get_scan(job.scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
        assert!(scan.finished_at.unwrap() >= scan.started_at);

        let persisted = store.get_results(job.scan_id).await.unwrap().unwrap();
        assert_eq!(persisted.subdomains.len(), 2);
        assert_eq!(persisted.urls.len(), 2);
        assert_eq!(persisted.ports.len(), 1);
        assert_eq!(persisted.vulnerabilities.len(), 1);

        let order: Vec<String> = runner.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(order, vec!["subfinder", "katana", "naabu", "nuclei"]);
    }

    #[tokio::test]
    async fn discovered_subdomains_feed_the_port_scan() {
        let runner = Arc::new(happy_runner());
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "example.com", &[]).await;

        pipeline.submit(&job).await.unwrap();

        let persisted = store.get_results(job.scan_id).await.unwrap().unwrap();
        assert_eq!(persisted.subdomains, vec!["api.example.com", "example.com"]);
        assert_eq!(
            runner.call_for("naabu").unwrap().stdin,
            Some(vec!["api.example.com".to_string(), "example.com".to_string()])
        );
    }

    #[tokio::test]
    async fn empty_enumeration_falls_back_to_target_host() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .stdout("subfinder", &[])
                .stdout("katana", &[])
                .stdout("naabu", &[])
                .stdout("nuclei", &[]),
        );
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "https://example.com", &[]).await;

        pipeline.submit(&job).await.unwrap();

        assert_eq!(runner.call_for("naabu").unwrap().stdin, Some(vec!["example.com".to_string()]));
        assert_eq!(
            runner.call_for("nuclei").unwrap().stdin,
            Some(vec!["https://example.com".to_string()])
        );
        let scan = store.get_scan(job.scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
        assert_eq!(store.get_results(job.scan_id).await.unwrap().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn port_scan_failure_keeps_earlier_findings_and_skips_templating() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .stdout("subfinder", SUBFINDER)
                .stdout("katana", KATANA)
                .fail("naabu", 1)
                .stdout("nuclei", NUCLEI),
        );
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "example.com", &[]).await;

        let err = pipeline.submit(&job).await.unwrap_err();

        let PipelineError::Stage(failure) = err else { panic!("expected a stage failure") };
        assert_eq!(failure.stage, Stage::ScanPorts);
        assert!(matches!(failure.cause, StageError::Tool(ref t) if t.program == "naabu"));

        let scan = store.get_scan(job.scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert!(scan.finished_at.unwrap() >= scan.started_at);

        let persisted = store.get_results(job.scan_id).await.unwrap().unwrap();
        assert_eq!(persisted.subdomains.len(), 2);
        assert_eq!(persisted.urls.len(), 2);
        assert!(persisted.ports.is_empty());
        assert!(persisted.vulnerabilities.is_empty());

        assert!(runner.call_for("nuclei").is_none());
    }

    #[tokio::test]
    async fn first_stage_failure_fails_the_scan_without_findings() {
        let runner = Arc::new(ScriptedRunner::new().fail("subfinder", 2));
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "example.com", &[]).await;

        let err = pipeline.submit(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Stage(ref f) if f.stage == Stage::EnumerateSubdomains));
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(store.get_results(job.scan_id).await.unwrap().unwrap().total(), 0);
        assert_eq!(store.get_scan(job.scan_id).await.unwrap().unwrap().status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn stage_timeout_fails_the_scan() {
        let runner = Arc::new(happy_runner().hang("katana"));
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone(), runner.clone(), ToolPaths::default(), Some(Duration::from_millis(25)));
        let job = job(&store, "example.com", &[]).await;

        let err = pipeline.submit(&job).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage(StageFailure { stage: Stage::CrawlUrls, cause: StageError::TimedOut(_) })
        ));
        assert_eq!(store.get_scan(job.scan_id).await.unwrap().unwrap().status, ScanStatus::Failed);
        assert!(runner.call_for("naabu").is_none());
    }

    #[tokio::test]
    async fn terminal_scan_is_not_rerun() {
        let runner = Arc::new(happy_runner());
        let (pipeline, store) = pipeline(runner.clone());
        let job = job(&store, "example.com", &[]).await;

        pipeline.submit(&job).await.unwrap();
        let first = store.get_scan(job.scan_id).await.unwrap().unwrap();

        let again = pipeline.submit(&job).await.unwrap();
        assert_eq!(again, Outcome::Skipped(ScanStatus::Completed));
        assert_eq!(runner.calls().len(), 4);
        assert_eq!(store.get_scan(job.scan_id).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn unknown_scan_is_rejected_before_any_tool_runs() {
        let runner = Arc::new(happy_runner());
        let (pipeline, _store) = pipeline(runner.clone());
        let orphan = Scan::new("example.com");
        let job = ScanJob { scan_id: orphan.id, target: orphan.target, template_filters: vec![] };

        let err = pipeline.submit(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::ScanNotFound(id) if id == orphan.id));
        assert!(runner.calls().is_empty());
    }
}
