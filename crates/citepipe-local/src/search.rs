use crate::config::Config;
use citepipe_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Google Custom Search returns at most this many items per call.
pub const GOOGLE_CSE_MAX_PER_CALL: usize = 10;

fn timeout_ms_from_query(q: &SearchQuery, default_ms: u64) -> u64 {
    q.timeout_ms.unwrap_or(default_ms).clamp(100, 60_000)
}

fn timings(t0: Instant) -> BTreeMap<String, u128> {
    let mut timings_ms = BTreeMap::new();
    timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
    timings_ms
}

/// Self-hosted SearXNG aggregator.
#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl SearxngSearchProvider {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.searxng_base_url.clone(),
            timeout_ms: cfg.search_timeout.as_millis() as u64,
        }
    }

    fn endpoint_search_for(base_endpoint: &str) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10);
        let timeout_ms = timeout_ms_from_query(q, self.timeout_ms);

        let resp = self
            .client
            .get(Self::endpoint_search_for(&self.base_url))
            .query(&[
                ("q", q.query.as_str()),
                ("format", "json"),
                ("categories", "general"),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        for r in parsed.results.unwrap_or_default().into_iter().take(max_results) {
            let Some(url) = r.url else { continue };
            out.push(SearchResult {
                url,
                title: r.title,
                snippet: r.content,
                source: "searxng".to_string(),
            });
        }

        Ok(SearchResponse {
            results: out,
            provider: "searxng".to_string(),
            timings_ms: timings(t0),
        })
    }
}

/// Google Custom Search JSON API.
#[derive(Debug, Clone)]
pub struct GoogleCseProvider {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
    endpoint: String,
    timeout_ms: u64,
}

impl GoogleCseProvider {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.google_search_api_key.clone(),
            cse_id: cfg.google_cse_id.clone(),
            endpoint: cfg.google_cse_endpoint.clone(),
            timeout_ms: cfg.search_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleCseResponse {
    items: Option<Vec<GoogleCseItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleCseItem {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for GoogleCseProvider {
    fn name(&self) -> &'static str {
        "google_cse"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let num = q
            .max_results
            .unwrap_or(GOOGLE_CSE_MAX_PER_CALL)
            .clamp(1, GOOGLE_CSE_MAX_PER_CALL);
        let timeout_ms = timeout_ms_from_query(q, self.timeout_ms);

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", q.query.as_str()),
                ("num", num.to_string().as_str()),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            // The request URL carries the API key.
            .map_err(|e| Error::Search(e.without_url().to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(Error::Quota {
                provider: "google_cse",
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::Search(format!("google_cse search HTTP {status}")));
        }

        let parsed: GoogleCseResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.without_url().to_string()))?;

        let mut out = Vec::new();
        for item in parsed.items.unwrap_or_default().into_iter().take(num) {
            let Some(url) = item.link else { continue };
            out.push(SearchResult {
                url,
                title: item.title,
                snippet: item.snippet,
                source: "google_cse".to_string(),
            });
        }

        Ok(SearchResponse {
            results: out,
            provider: "google_cse".to_string(),
            timings_ms: timings(t0),
        })
    }
}

/// Last-resort strategy: templates the query into well-known reference/news sites.
///
/// Performs no network IO; it only guarantees the crawl stage has candidates when
/// both live search paths are down.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSiteProvider;

impl ReferenceSiteProvider {
    pub fn urls_for(query: &str) -> Result<Vec<String>> {
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Err(Error::Search("cannot template an empty query".to_string()));
        }
        let spaced = words.join(" ");
        let slug = words.join("-").to_lowercase();
        let Some(initial) = slug.chars().next() else {
            return Err(Error::Search("cannot template an empty query".to_string()));
        };

        let wiki = with_path_segments("https://en.wikipedia.org/wiki/", &[&words.join("_")])?;
        let investopedia = with_path_segments(
            "https://www.investopedia.com/terms/",
            &[&initial.to_string(), &format!("{slug}.asp")],
        )?;
        let q = [("q", spaced.as_str())];
        let mut out = vec![wiki, investopedia];
        for base in [
            "https://www.forbes.com/search/",
            "https://www.businessinsider.com/s",
            "https://medium.com/search",
        ] {
            let u = url::Url::parse_with_params(base, &q)
                .map_err(|e| Error::InvalidUrl(e.to_string()))?;
            out.push(u.to_string());
        }
        Ok(out)
    }
}

fn with_path_segments(base: &str, segments: &[&str]) -> Result<String> {
    let mut u = url::Url::parse(base).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    {
        let mut segs = u
            .path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("cannot-be-a-base url: {base}")))?;
        segs.pop_if_empty();
        for s in segments {
            segs.push(s);
        }
    }
    Ok(u.to_string())
}

#[async_trait::async_trait]
impl SearchProvider for ReferenceSiteProvider {
    fn name(&self) -> &'static str {
        "reference_sites"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(usize::MAX);
        let results = Self::urls_for(&q.query)?
            .into_iter()
            .take(max_results)
            .map(|url| SearchResult {
                url,
                title: None,
                snippet: None,
                source: "reference_sites".to_string(),
            })
            .collect();
        Ok(SearchResponse {
            results,
            provider: "reference_sites".to_string(),
            timings_ms: timings(t0),
        })
    }
}
