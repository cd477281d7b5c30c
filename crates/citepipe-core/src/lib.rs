use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub mod filter;

/// Upper bound applied to a caller's `max_results` before any provider sees it.
pub const MAX_RESULTS_CAP: usize = 20;
/// Extracted text at or below this many chars is not treated as a document.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Stored document content is cut to this many chars.
pub const MAX_CONTENT_CHARS: usize = 5_000;
/// Synthesis reads at most this many documents, in received order.
pub const SYNTHESIS_MAX_DOCUMENTS: usize = 5;
/// Per-document excerpt length placed into the generation prompt.
pub const SYNTHESIS_EXCERPT_CHARS: usize = 2_000;
/// Citation snippet length (an ellipsis is appended when content is longer).
pub const SNIPPET_CHARS: usize = 200;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("quota or access error from {provider}: HTTP {status}")]
    Quota { provider: &'static str, status: u16 },
    #[error("crawl failed: {0}")]
    Crawl(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Extract,
    Synthesize,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Extract => "extract",
            Self::Synthesize => "synthesize",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt inside a stage that tries several strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub cause: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.cause)
    }
}

fn join_failures(causes: &[ProviderFailure]) -> String {
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classified, query-scoped failure of a research run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("all search methods failed ({})", join_failures(.causes))]
    DiscoveryExhausted { causes: Vec<ProviderFailure> },
    #[error("no relevant URLs found")]
    NoSourcesFound,
    #[error("no content could be extracted from any URL (crawl: {crawl}; fallback: {fallback})")]
    ExtractionExhausted { crawl: String, fallback: String },
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("synthesis invoked with no documents")]
    EmptyInput,
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidQuery(_) | Self::DiscoveryExhausted { .. } | Self::NoSourcesFound => {
                Stage::Discover
            }
            Self::ExtractionExhausted { .. } => Stage::Extract,
            Self::SynthesisFailed(_) | Self::EmptyInput => Stage::Synthesize,
        }
    }

    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::DiscoveryExhausted { .. } => "discovery_exhausted",
            Self::NoSourcesFound => "no_sources_found",
            Self::ExtractionExhausted { .. } => "extraction_exhausted",
            Self::SynthesisFailed(_) => "synthesis_failed",
            Self::EmptyInput => "empty_input",
        }
    }
}

/// Validated pipeline input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub query: String,
    pub max_results: usize,
}

impl ResearchQuery {
    /// Rejects blank queries and clamps `max_results` into `1..=MAX_RESULTS_CAP`.
    pub fn new(
        query: impl Into<String>,
        max_results: usize,
    ) -> std::result::Result<Self, PipelineError> {
        let query = query.into().trim().to_string();
        if query.is_empty() {
            return Err(PipelineError::InvalidQuery("query must not be empty".to_string()));
        }
        Ok(Self {
            query,
            max_results: max_results.clamp(1, MAX_RESULTS_CAP),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results: Some(max_results),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (network + body read).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// Description of one batch crawl: exactly `urls`, no link following.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub urls: Vec<String>,
    pub max_concurrency: u32,
    pub max_requests_per_minute: u32,
    pub max_request_retries: u32,
    /// Run-time limit enforced by the crawl service itself.
    pub max_run_minutes: u32,
    pub block_resources: Vec<String>,
    pub remove_elements_selector: String,
    /// Wall-clock ceiling enforced by this side while waiting for the job.
    pub timeout_ms: u64,
}

impl CrawlJob {
    pub fn for_urls(urls: &[String], timeout: Duration) -> Self {
        Self {
            urls: urls.to_vec(),
            max_concurrency: 2,
            max_requests_per_minute: 60,
            max_request_retries: 1,
            max_run_minutes: 8,
            block_resources: ["stylesheet", "image", "font", "media"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            remove_elements_selector:
                "nav, footer, script, style, noscript, svg, .advertisement, .ads, .popup"
                    .to_string(),
            timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Handle to a finished crawl job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: String,
    pub status: String,
    pub dataset_id: String,
}

/// One result row of a crawl job. Any of the text fields may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlItem {
    pub url: Option<String>,
    pub title: Option<String>,
    pub readable_text: Option<String>,
    pub text: Option<String>,
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait BatchCrawler: Send + Sync {
    fn name(&self) -> &'static str;
    /// Submit the job and wait (bounded by `job.timeout()`) for it to finish.
    async fn submit(&self, job: &CrawlJob) -> Result<CrawlRun>;
    /// Read one page of result items.
    async fn list_items(&self, run: &CrawlRun, offset: usize, limit: usize)
        -> Result<Vec<CrawlItem>>;
}

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    /// One atomic, non-streaming generation call.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Extracted text for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub url: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    /// Builds a document if `content` is substantial, cutting it to `MAX_CONTENT_CHARS`.
    pub fn bounded(
        url: impl Into<String>,
        title: impl Into<String>,
        content: &str,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        let content = content.trim();
        if content.chars().count() <= MIN_CONTENT_CHARS {
            return None;
        }
        let (content, _) = truncate_chars(content, MAX_CONTENT_CHARS);
        Some(Self {
            content,
            url: url.into(),
            title: title.into(),
            fetched_at,
        })
    }
}

#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract(&self, urls: &[String]) -> Result<Vec<Document>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: usize,
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub sources: Vec<String>,
    /// Documents extracted before the synthesis cap was applied.
    pub total_documents: usize,
    /// Discovery strategy that produced the URLs.
    pub provider: String,
}

/// Char-boundary-safe prefix. Returns `(prefix, was_truncated)`.
pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => (s[..byte].to_string(), true),
        None => (s.to_string(), false),
    }
}
