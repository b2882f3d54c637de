// src/core/stages/subdomains.rs

use serde::Deserialize;
use tracing::info;

use super::{decode_records, Stage, StageContext, StageError};
use crate::core::models::{ScanJob, StageResult};
use crate::core::target;

/// One line of `subfinder -oJ` output. Other fields (`input`, `source`) are ignored.
#[derive(Debug, Deserialize)]
struct SubfinderHit {
    host: String,
}

/// Enumerates subdomains of the target's host with subfinder.
pub async fn run(ctx: &StageContext, job: &ScanJob, prior: StageResult) -> Result<StageResult, StageError> {
    let domain = target::to_host(&job.target);
    info!(scan_id = %job.scan_id, target = %job.target, domain = %domain, "Starting subdomain enumeration.");

    let args = vec!["-d".to_string(), domain, "-silent".to_string(), "-oJ".to_string()];
    let raw = ctx.invoke(&ctx.tools.subfinder, &args, None).await?;

    let subdomains: Vec<String> = decode_records::<SubfinderHit>(Stage::EnumerateSubdomains, &raw)
        .into_iter()
        .map(|hit| hit.host.trim().to_string())
        .filter(|host| !host.is_empty())
        .collect();

    ctx.store.append_subdomains(job.scan_id, &subdomains).await?;
    info!(scan_id = %job.scan_id, count = subdomains.len(), "Subdomain enumeration finished.");

    Ok(StageResult { subdomains, ..prior })
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::store::ScanStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn passes_host_form_and_persists_hosts() {
        let runner = Arc::new(ScriptedRunner::new().stdout(
            "subfinder",
            &[
                r#"{"host":"api.example.com","input":"example.com","source":"crtsh"}"#,
                r#"{"host":"example.com","input":"example.com","source":"dnsdumpster"}"#,
            ],
        ));
        let (ctx, store) = context(runner.clone());
        let job = job(&store, "https://example.com/login", &[]).await;

        let result = run(&ctx, &job, StageResult::default()).await.unwrap();

        assert_eq!(result.subdomains, vec!["api.example.com", "example.com"]);
        let call = runner.call_for("subfinder").unwrap();
        assert_eq!(call.args, vec!["-d", "example.com", "-silent", "-oJ"]);
        assert_eq!(call.stdin, None);

        let persisted = store.get_results(job.scan_id).await.unwrap().unwrap();
        assert_eq!(persisted.subdomains, result.subdomains);
    }

    #[tokio::test]
    async fn no_output_is_an_empty_success() {
        let runner = Arc::new(ScriptedRunner::new().stdout("subfinder", &[]));
        let (ctx, store) = context(runner);
        let job = job(&store, "example.com", &[]).await;

        let result = run(&ctx, &job, StageResult::default()).await.unwrap();
        assert!(result.subdomains.is_empty());
    }

    #[tokio::test]
    async fn records_without_host_are_dropped() {
        let runner = Arc::new(ScriptedRunner::new().stdout(
            "subfinder",
            &[r#"{"source":"crtsh"}"#, r#"{"host":"  "}"#, r#"{"host":"www.example.com"}"#],
        ));
        let (ctx, store) = context(runner);
        let job = job(&store, "example.com", &[]).await;

        let result = run(&ctx, &job, StageResult::default()).await.unwrap();
        assert_eq!(result.subdomains, vec!["www.example.com"]);
    }
}
