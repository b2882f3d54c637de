// src/core/stages/mod.rs

// One module per pipeline stage. Each wraps a single tool invocation, maps the
// tool's JSON lines into finding records and persists them before returning.
pub mod crawl;
pub mod ports;
pub mod subdomains;
pub mod vulnerabilities;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter};
use thiserror::Error;
use tracing::warn;

use crate::config::ToolPaths;
use crate::core::models::{ScanJob, StageResult};
use crate::core::store::{ScanStore, StoreError};
use crate::core::tool::{ToolFailure, ToolRunner};

/// The pipeline stages, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    EnumerateSubdomains,
    CrawlUrls,
    ScanPorts,
    ScanVulnerabilities,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Tool(#[from] ToolFailure),

    #[error("persisting findings failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("tool did not finish within {0:?}")]
    TimedOut(Duration),
}

/// A stage that did not complete, and why.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
}

/// Everything a stage needs besides the job itself.
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<dyn ScanStore>,
    pub runner: Arc<dyn ToolRunner>,
    pub tools: ToolPaths,
    /// Upper bound on one tool invocation. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl StageContext {
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[String]>,
    ) -> Result<Vec<Value>, StageError> {
        let call = self.runner.invoke(program, args, stdin);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => Ok(result?),
                Err(_) => {
                    warn!(program, timeout = ?limit, "Tool invocation timed out.");
                    Err(StageError::TimedOut(limit))
                }
            },
            None => Ok(call.await?),
        }
    }
}

impl Stage {
    /// Runs this stage and returns `prior` extended with its findings.
    pub async fn run(
        self,
        ctx: &StageContext,
        job: &ScanJob,
        prior: StageResult,
    ) -> Result<StageResult, StageError> {
        match self {
            Stage::EnumerateSubdomains => subdomains::run(ctx, job, prior).await,
            Stage::CrawlUrls => crawl::run(ctx, job, prior).await,
            Stage::ScanPorts => ports::run(ctx, job, prior).await,
            Stage::ScanVulnerabilities => vulnerabilities::run(ctx, job, prior).await,
        }
    }
}

/// Deserializes each raw record into `T`, dropping (and logging) the ones
/// that don't fit. A stray record never fails the stage.
fn decode_records<T: DeserializeOwned>(stage: Stage, raw: &[Value]) -> Vec<T> {
    raw.iter()
        .filter_map(|value| match T::deserialize(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(stage = %stage, record = %value, error = %e, "Dropping record with unexpected shape.");
                None
            }
        })
        .collect()
}
