// src/core/stages/crawl.rs

use serde::Deserialize;
use tracing::{debug, info};

use super::{decode_records, Stage, StageContext, StageError};
use crate::core::models::{ScanJob, StageResult};
use crate::core::target;

/// One line of `katana -jsonl` output. Older releases put the URL at the top
/// level; newer ones nest it under `request.endpoint`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KatanaHit {
    url: Option<String>,
    request: Option<KatanaRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KatanaRequest {
    endpoint: Option<String>,
}

impl KatanaHit {
    fn into_url(self) -> Option<String> {
        self.url
            .or_else(|| self.request.and_then(|r| r.endpoint))
            .filter(|u| !u.is_empty())
    }
}

/// Crawls the target's URL form with katana.
pub async fn run(ctx: &StageContext, job: &ScanJob, prior: StageResult) -> Result<StageResult, StageError> {
    let url = target::to_url(&job.target);
    info!(scan_id = %job.scan_id, url = %url, "Starting crawl.");

    let args = vec!["-u".to_string(), url, "-silent".to_string(), "-jsonl".to_string()];
    let raw = ctx.invoke(&ctx.tools.katana, &args, None).await?;

    let hits = decode_records::<KatanaHit>(Stage::CrawlUrls, &raw);
    let seen = hits.len();
    let urls: Vec<String> = hits.into_iter().filter_map(KatanaHit::into_url).collect();
    if urls.len() < seen {
        debug!(scan_id = %job.scan_id, dropped = seen - urls.len(), "Dropped crawl records without a URL.");
    }

    ctx.store.append_urls(job.scan_id, &urls).await?;
    info!(scan_id = %job.scan_id, count = urls.len(), "Crawl finished.");

    Ok(StageResult { urls, ..prior })
}
