//! Content extraction: one batch crawl, with sequential direct fetches as the fallback.

use crate::extract::{html_to_text, readable_page};
use crate::{apify::ApifyCrawler, config::Config, LocalFetcher};
use chrono::{DateTime, Utc};
use citepipe_core::{
    BatchCrawler, ContentExtractor, CrawlItem, CrawlJob, Document, Error, FetchBackend,
    FetchRequest, PipelineError, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dataset rows requested per page.
const DEFAULT_PAGE_SIZE: usize = 50;
/// Body bytes read per direct fetch.
const DIRECT_FETCH_MAX_BYTES: u64 = 2 * 1024 * 1024;

const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// First non-blank text field of a crawl row, in preference order.
fn item_text(item: &CrawlItem) -> Option<String> {
    let non_blank = |s: &Option<String>| {
        s.as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
    };
    non_blank(&item.readable_text)
        .or_else(|| non_blank(&item.text))
        .or_else(|| non_blank(&item.markdown))
        .or_else(|| non_blank(&item.html).map(|h| html_to_text(&h, 100)))
}

/// Converts a crawl row into a document. Rows without a url or with thin text are dropped.
pub fn document_from_item(item: &CrawlItem, now: DateTime<Utc>) -> Option<Document> {
    let url = item.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
    let text = item_text(item)?;
    let title = item.title.as_deref().map(str::trim).unwrap_or_default();
    Document::bounded(url, title, &text, item.loaded_at.unwrap_or(now))
}

pub struct CrawlExtractor {
    crawler: Box<dyn BatchCrawler>,
    job_timeout: Duration,
    page_size: usize,
}

impl CrawlExtractor {
    pub fn new(crawler: Box<dyn BatchCrawler>, job_timeout: Duration) -> Self {
        Self {
            crawler,
            job_timeout,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait::async_trait]
impl ContentExtractor for CrawlExtractor {
    fn name(&self) -> &'static str {
        self.crawler.name()
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<Document>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let job = CrawlJob::for_urls(urls, self.job_timeout);
        let run = self.crawler.submit(&job).await?;

        let now = Utc::now();
        let mut docs: Vec<Document> = Vec::new();
        let mut offset = 0usize;
        loop {
            let page = match self.crawler.list_items(&run, offset, self.page_size).await {
                Ok(page) => page,
                Err(e) if offset == 0 => return Err(e),
                Err(e) => {
                    warn!(run_id = %run.id, offset, error = %e, "dataset read failed; keeping rows read so far");
                    break;
                }
            };
            let n = page.len();
            docs.extend(page.iter().filter_map(|it| document_from_item(it, now)));
            offset += n;
            debug!(run_id = %run.id, offset, kept = docs.len(), "read dataset page");
            if n < self.page_size || docs.len() >= urls.len() {
                break;
            }
        }
        docs.truncate(urls.len());

        if docs.is_empty() {
            return Err(Error::Crawl(format!(
                "failed to crawl any content from {} URLs",
                urls.len()
            )));
        }
        if docs.len() < urls.len() {
            warn!(
                extracted = docs.len(),
                requested = urls.len(),
                "crawl returned content for only some URLs"
            );
        }
        Ok(docs)
    }
}

/// Sequential GETs with randomized pacing and browser-like headers.
pub struct DirectFetchExtractor {
    fetcher: Arc<dyn FetchBackend>,
    timeout: Duration,
    delay_min: Duration,
    delay_max: Duration,
}

impl DirectFetchExtractor {
    pub fn new(fetcher: Arc<dyn FetchBackend>, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            delay_min: Duration::from_secs(1),
            delay_max: Duration::from_secs(3),
        }
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.delay_min = min;
        self.delay_max = max.max(min);
        self
    }

    fn pause(&self) -> Duration {
        let lo = self.delay_min.as_millis() as u64;
        let hi = self.delay_max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(lo..=hi))
    }

    fn request_for(&self, url: &str) -> FetchRequest {
        let ua = BROWSER_USER_AGENTS[fastrand::usize(..BROWSER_USER_AGENTS.len())];
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), ua.to_string());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.5".to_string());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        FetchRequest {
            url: url.to_string(),
            timeout_ms: Some(self.timeout.as_millis() as u64),
            max_bytes: Some(DIRECT_FETCH_MAX_BYTES),
            headers,
        }
    }

    async fn fetch_one(&self, url: &str) -> Result<Option<Document>> {
        let resp = self.fetcher.fetch(&self.request_for(url)).await?;
        if !resp.is_success() {
            return Err(Error::Fetch(format!("HTTP {} for {url}", resp.status)));
        }
        let page = readable_page(&resp.text_lossy());
        let title = page.title.unwrap_or_else(|| url.to_string());
        Ok(Document::bounded(url, title, &page.text, Utc::now()))
    }
}

#[async_trait::async_trait]
impl ContentExtractor for DirectFetchExtractor {
    fn name(&self) -> &'static str {
        "direct_fetch"
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pause()).await;
            }
            match self.fetch_one(url).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => debug!(url = %url, "page too thin; skipped"),
                Err(e) => warn!(url = %url, error = %e, "direct fetch failed; skipped"),
            }
        }
        info!(
            extracted = docs.len(),
            requested = urls.len(),
            "direct fetch complete"
        );
        Ok(docs)
    }
}

/// Primary extractor with a single fallback.
pub struct Extraction {
    primary: Box<dyn ContentExtractor>,
    fallback: Box<dyn ContentExtractor>,
}

impl Extraction {
    pub fn new(primary: Box<dyn ContentExtractor>, fallback: Box<dyn ContentExtractor>) -> Self {
        Self { primary, fallback }
    }

    /// Apify crawl first, direct fetch second.
    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Self {
        let crawl = CrawlExtractor::new(
            Box::new(ApifyCrawler::new(client.clone(), cfg)),
            cfg.crawl_timeout,
        );
        let direct = DirectFetchExtractor::new(
            Arc::new(LocalFetcher::with_client(client)),
            cfg.fetch_timeout,
        )
        .with_delay(cfg.fetch_delay_min, cfg.fetch_delay_max);
        Self::new(Box::new(crawl), Box::new(direct))
    }

    /// At most `urls.len()` documents. The fallback runs only when the primary errors
    /// or comes back empty.
    pub async fn extract(&self, urls: &[String]) -> std::result::Result<Vec<Document>, PipelineError> {
        let primary_cause = match self.primary.extract(urls).await {
            Ok(mut docs) if !docs.is_empty() => {
                docs.truncate(urls.len());
                info!(extractor = self.primary.name(), documents = docs.len(), "extraction complete");
                return Ok(docs);
            }
            Ok(_) => "no documents".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(
            extractor = self.primary.name(),
            cause = %primary_cause,
            fallback = self.fallback.name(),
            "primary extraction produced nothing; falling back"
        );

        match self.fallback.extract(urls).await {
            Ok(mut docs) if !docs.is_empty() => {
                docs.truncate(urls.len());
                info!(extractor = self.fallback.name(), documents = docs.len(), "extraction complete");
                Ok(docs)
            }
            Ok(_) => Err(PipelineError::ExtractionExhausted {
                crawl: primary_cause,
                fallback: "no documents".to_string(),
            }),
            Err(e) => Err(PipelineError::ExtractionExhausted {
                crawl: primary_cause,
                fallback: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor that returns a fixed set of documents (or an error) and counts calls.
    pub(crate) struct FakeExtractor {
        pub(crate) name: &'static str,
        pub(crate) docs: Option<Vec<Document>>,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl FakeExtractor {
        pub(crate) fn returning(name: &'static str, docs: Vec<Document>) -> Self {
            Self {
                name,
                docs: Some(docs),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            Self {
                name,
                docs: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContentExtractor for FakeExtractor {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn extract(&self, _urls: &[String]) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.docs
                .clone()
                .ok_or_else(|| Error::Crawl(format!("{} down", self.name)))
        }
    }

    pub(crate) fn doc(url: &str, title: &str) -> Document {
        Document::bounded(url, title, &format!("{title} {}", "body text ".repeat(30)), Utc::now())
            .unwrap_or_else(|| panic!("fixture document for {url} too short"))
    }
}
