// src/core/stages/vulnerabilities.rs

use serde::Deserialize;
use tracing::info;

use super::{decode_records, Stage, StageContext, StageError};
use crate::core::models::{ScanJob, StageResult, VulnerabilityRecord};
use crate::core::target;

/// Severity recorded when the template doesn't declare one.
const UNKNOWN_SEVERITY: &str = "unknown";

/// One line of `nuclei -jsonl` output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NucleiHit {
    #[serde(rename = "templateID")]
    template_id: Option<String>,
    info: NucleiInfo,
    matched: Option<String>,
    #[serde(rename = "matched-at")]
    matched_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NucleiInfo {
    name: Option<String>,
    severity: Option<String>,
}

impl From<NucleiHit> for VulnerabilityRecord {
    fn from(hit: NucleiHit) -> Self {
        Self {
            template_id: hit.template_id.unwrap_or_default(),
            severity: hit
                .info
                .severity
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SEVERITY.to_string()),
            matched_url: hit.matched.or(hit.matched_at).unwrap_or_default(),
            description: hit.info.name.unwrap_or_default(),
        }
    }
}

/// Targets for templating: everything enumerated so far, or the target's URL
/// form when enumeration found nothing.
fn template_targets(job: &ScanJob, prior: &StageResult) -> Vec<String> {
    if prior.subdomains.is_empty() {
        vec![target::to_url(&job.target)]
    } else {
        prior.subdomains.clone()
    }
}

fn nuclei_args(template_filters: &[String]) -> Vec<String> {
    let mut args = vec!["-list".to_string(), "-".to_string(), "-jsonl".to_string()];
    for filter in template_filters {
        args.push("-t".to_string());
        args.push(filter.clone());
    }
    args
}

/// Runs nuclei templates against the discovered targets.
pub async fn run(ctx: &StageContext, job: &ScanJob, prior: StageResult) -> Result<StageResult, StageError> {
    let targets = template_targets(job, &prior);
    info!(
        scan_id = %job.scan_id,
        targets = ?targets,
        templates = ?job.template_filters,
        "Starting vulnerability scan."
    );

    let args = nuclei_args(&job.template_filters);
    let raw = ctx.invoke(&ctx.tools.nuclei, &args, Some(&targets)).await?;

    let vulnerabilities: Vec<VulnerabilityRecord> = decode_records::<NucleiHit>(Stage::ScanVulnerabilities, &raw)
        .into_iter()
        .map(VulnerabilityRecord::from)
        .collect();

    ctx.store.append_vulnerabilities(job.scan_id, &vulnerabilities).await?;
    info!(scan_id = %job.scan_id, count = vulnerabilities.len(), "Vulnerability scan finished.");

    Ok(StageResult { vulnerabilities, ..prior })
}
