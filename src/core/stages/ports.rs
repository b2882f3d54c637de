// src/core/stages/ports.rs

use serde::Deserialize;
use tracing::{info, warn};

use super::{decode_records, Stage, StageContext, StageError};
use crate::core::models::{PortRecord, ScanJob, StageResult};
use crate::core::target;

/// One line of `naabu -json` output.
#[derive(Debug, Deserialize)]
struct NaabuHit {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    host: Option<String>,
    port: u16,
}

/// Hosts to probe: everything enumerated so far, or the target itself when
/// enumeration found nothing.
fn port_scan_hosts(job: &ScanJob, prior: &StageResult) -> Vec<String> {
    if prior.subdomains.is_empty() {
        vec![target::to_host(&job.target)]
    } else {
        prior.subdomains.clone()
    }
}

/// Scans the discovered hosts for open ports with naabu.
pub async fn run(ctx: &StageContext, job: &ScanJob, prior: StageResult) -> Result<StageResult, StageError> {
    let hosts = port_scan_hosts(job, &prior);
    info!(scan_id = %job.scan_id, hosts = ?hosts, "Starting port scan.");

    let args = vec!["-silent".to_string(), "-json".to_string()];
    let raw = ctx.invoke(&ctx.tools.naabu, &args, Some(&hosts)).await?;

    let ports: Vec<PortRecord> = decode_records::<NaabuHit>(Stage::ScanPorts, &raw)
        .into_iter()
        .filter_map(|hit| match hit.ip.or(hit.host).filter(|ip| !ip.is_empty()) {
            Some(ip) => Some(PortRecord { ip, port: hit.port }),
            None => {
                warn!(scan_id = %job.scan_id, port = hit.port, "Dropping port record without an address.");
                None
            }
        })
        .collect();

    ctx.store.append_ports(job.scan_id, &ports).await?;
    info!(scan_id = %job.scan_id, count = ports.len(), "Port scan finished.");

    Ok(StageResult { ports, ..prior })
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::store::ScanStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn scans_discovered_subdomains_over_stdin() {
        let runner = Arc::new(ScriptedRunner::new().stdout(
            "naabu",
            &[
                r#"{"host":"api.example.com","ip":"93.184.216.34","port":443,"protocol":"tcp"}"#,
                r#"{"host":"example.com","ip":"93.184.216.34","port":80,"protocol":"tcp"}"#,
            ],
        ));
        let (ctx, store) = context(runner.clone());
        let job = job(&store, "example.com", &[]).await;
        let prior = StageResult {
            subdomains: vec!["api.example.com".into(), "example.com".into()],
            ..Default::default()
        };

        let result = run(&ctx, &job, prior).await.unwrap();

        let call = runner.call_for("naabu").unwrap();
        assert_eq!(call.args, vec!["-silent", "-json"]);
        assert_eq!(call.stdin, Some(vec!["api.example.com".into(), "example.com".into()]));
        assert_eq!(
            result.ports,
            vec![
                PortRecord { ip: "93.184.216.34".into(), port: 443 },
                PortRecord { ip: "93.184.216.34".into(), port: 80 },
            ]
        );
        let persisted = store.get_results(job.scan_id).await.unwrap().unwrap();
        assert_eq!(persisted.ports, result.ports);
    }

    #[tokio::test]
    async fn falls_back_to_target_host_without_subdomains() {
        let runner = Arc::new(ScriptedRunner::new().stdout("naabu", &[]));
        let (ctx, store) = context(runner.clone());
        let job = job(&store, "https://example.com", &[]).await;

        run(&ctx, &job, StageResult::default()).await.unwrap();

        assert_eq!(runner.call_for("naabu").unwrap().stdin, Some(vec!["example.com".to_string()]));
    }

    #[tokio::test]
    async fn uses_host_when_ip_missing_and_drops_unusable_records() {
        let runner = Arc::new(ScriptedRunner::new().stdout(
            "naabu",
            &[r#"{"host":"10.0.0.5","port":22}"#, r#"{"port":8080}"#, r#"{"ip":"10.0.0.6"}"#],
        ));
        let (ctx, store) = context(runner);
        let job = job(&store, "10.0.0.0", &[]).await;

        let result = run(&ctx, &job, StageResult::default()).await.unwrap();
        assert_eq!(result.ports, vec![PortRecord { ip: "10.0.0.5".into(), port: 22 }]);
    }
}
