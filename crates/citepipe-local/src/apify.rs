//! Apify website-content-crawler as a batch crawl backend.
//!
//! Flow: start an actor run with the job input, long-poll the run until it reaches a
//! terminal status, then page through the run's default dataset.

use crate::config::Config;
use citepipe_core::{BatchCrawler, CrawlItem, CrawlJob, CrawlRun, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Seconds the API may hold a run-status request open before answering.
const WAIT_FOR_FINISH_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ApifyCrawler {
    client: reqwest::Client,
    token: String,
    base_url: String,
    actor: String,
}

impl ApifyCrawler {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            token: cfg.apify_api_token.clone(),
            base_url: cfg.apify_base_url.trim_end_matches('/').to_string(),
            actor: cfg.apify_actor.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let (body, _) = citepipe_core::truncate_chars(body.trim(), 200);
        Err(Error::Crawl(format!("apify {what} HTTP {status}: {body}")))
    }

    async fn start(&self, job: &CrawlJob) -> Result<RunData> {
        let timeout_secs = job.timeout().as_secs().max(1).to_string();
        let resp = self
            .client
            .post(self.endpoint(&format!("acts/{}/runs", self.actor)))
            .bearer_auth(&self.token)
            .query(&[("timeout", timeout_secs.as_str())])
            .json(&run_input(job))
            .send()
            .await
            .map_err(|e| Error::Crawl(e.to_string()))?;
        let resp = Self::check(resp, "start run").await?;
        let parsed: ApiResponse<RunData> =
            resp.json().await.map_err(|e| Error::Crawl(e.to_string()))?;
        Ok(parsed.data)
    }

    async fn wait_for_run(&self, run: RunData) -> Result<RunData> {
        let mut run = run;
        loop {
            match run.status.as_str() {
                "SUCCEEDED" => return Ok(run),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(Error::Crawl(format!(
                        "apify run {} ended with status {}",
                        run.id, run.status
                    )));
                }
                _ => debug!(run_id = %run.id, status = %run.status, "crawl run still in progress"),
            }
            let wait = WAIT_FOR_FINISH_SECS.to_string();
            let resp = self
                .client
                .get(self.endpoint(&format!("actor-runs/{}", run.id)))
                .bearer_auth(&self.token)
                .query(&[("waitForFinish", wait.as_str())])
                .send()
                .await
                .map_err(|e| Error::Crawl(e.to_string()))?;
            let resp = Self::check(resp, "run status").await?;
            let parsed: ApiResponse<RunData> =
                resp.json().await.map_err(|e| Error::Crawl(e.to_string()))?;
            run = parsed.data;
        }
    }
}

/// Actor input: crawl exactly the given URLs, slowly, with resource blocking and
/// boilerplate removal.
fn run_input(job: &CrawlJob) -> serde_json::Value {
    let start_urls: Vec<serde_json::Value> = job
        .urls
        .iter()
        .map(|u| serde_json::json!({ "url": u }))
        .collect();
    serde_json::json!({
        "startUrls": start_urls,
        "crawlerType": "playwright:firefox",
        "maxCrawlDepth": 0,
        "maxCrawlPages": job.urls.len(),
        "maxResults": job.urls.len(),
        "skipLinkExtraction": true,
        "ignoreCanonicalUrl": true,
        "maxConcurrency": job.max_concurrency,
        "maxRequestsPerMinute": job.max_requests_per_minute,
        "maxSessionPoolSize": 5,
        "maxSessionsPerCrawl": 3,
        "maxSessionUsageCount": 3,
        "sessionRotationSecs": 300,
        "maxRequestRetries": job.max_request_retries,
        "maxRetryCount": job.max_request_retries,
        "maxRunTimeMinutes": job.max_run_minutes,
        "requestTimeoutSecs": 45,
        "navigationTimeoutSecs": 45,
        "waitForSelector": "body",
        "waitForSelectorTimeoutMillis": 10_000,
        "maxScrollHeightPixels": 500,
        "blockResources": job.block_resources,
        "removeElementsCssSelector": job.remove_elements_selector,
        "textContent": "readableText",
        "saveHtml": false,
        "saveMarkdown": false,
        "saveScreenshots": false,
        "stealthMode": true,
        "randomizeUserAgent": true,
        "ignoreSslErrors": true,
        "ignoreHttpsErrors": true,
        "ignoreCorsAndCsp": true,
        "proxyConfiguration": {
            "useApifyProxy": true,
            "proxyCountryCode": "US"
        }
    })
}

#[async_trait::async_trait]
impl BatchCrawler for ApifyCrawler {
    fn name(&self) -> &'static str {
        "apify"
    }

    async fn submit(&self, job: &CrawlJob) -> Result<CrawlRun> {
        let t0 = Instant::now();
        info!(urls = job.urls.len(), actor = %self.actor, "starting crawl run");
        let run = tokio::time::timeout(job.timeout(), async {
            let started = self.start(job).await?;
            info!(run_id = %started.id, "crawl run started, waiting for completion");
            self.wait_for_run(started).await
        })
        .await
        .map_err(|_| {
            Error::Crawl(format!(
                "crawl job exceeded its {}ms ceiling",
                job.timeout().as_millis()
            ))
        })??;
        info!(
            run_id = %run.id,
            dataset_id = %run.default_dataset_id,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "crawl run completed"
        );
        Ok(CrawlRun {
            id: run.id,
            status: run.status,
            dataset_id: run.default_dataset_id,
        })
    }

    async fn list_items(
        &self,
        run: &CrawlRun,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CrawlItem>> {
        let (offset, limit) = (offset.to_string(), limit.to_string());
        let resp = self
            .client
            .get(self.endpoint(&format!("datasets/{}/items", run.dataset_id)))
            .bearer_auth(&self.token)
            .query(&[
                ("format", "json"),
                ("clean", "true"),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Crawl(e.to_string()))?;
        let resp = Self::check(resp, "dataset items").await?;
        let items: Vec<DatasetItem> =
            resp.json().await.map_err(|e| Error::Crawl(e.to_string()))?;
        Ok(items.into_iter().map(CrawlItem::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RunData {
    id: String,
    status: String,
    #[serde(rename = "defaultDatasetId")]
    default_dataset_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetItem {
    url: Option<String>,
    title: Option<String>,
    metadata: Option<ItemMetadata>,
    #[serde(rename = "readableText")]
    readable_text: Option<String>,
    text: Option<String>,
    markdown: Option<String>,
    html: Option<String>,
    #[serde(rename = "loadedTime")]
    loaded_time: Option<String>,
    crawl: Option<ItemCrawl>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemMetadata {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemCrawl {
    #[serde(rename = "loadedTime")]
    loaded_time: Option<String>,
}

fn parse_time(s: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s?.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl From<DatasetItem> for CrawlItem {
    fn from(it: DatasetItem) -> Self {
        let loaded_at = parse_time(it.loaded_time.as_deref()).or_else(|| {
            parse_time(it.crawl.as_ref().and_then(|c| c.loaded_time.as_deref()))
        });
        let title = it.title.or_else(|| it.metadata.and_then(|m| m.title));
        Self {
            url: it.url,
            title,
            readable_text: it.readable_text,
            text: it.text,
            markdown: it.markdown,
            html: it.html,
            loaded_at,
        }
    }
}
