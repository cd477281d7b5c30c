use citepipe_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod apify;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod extraction;
pub mod gemini;
pub mod pipeline;
pub mod search;
pub mod synthesis;

pub use config::{Config, ConfigStatus};
pub use pipeline::ResearchPipeline;

/// Shared client for every outbound call. Per-request timeouts come from `Config`.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("citepipe/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Plain HTTP GET backend used by the direct-fetch extraction path.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn apply_headers(
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let t0 = std::time::Instant::now();
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        rb = Self::apply_headers(rb, &req.headers);
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("network_fetch".to_string(), t0.elapsed().as_millis());
        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
            timings_ms,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::get, Router};

    fn req(url: String, max_bytes: Option<u64>) -> FetchRequest {
        FetchRequest {
            url,
            timeout_ms: Some(2_000),
            max_bytes,
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn local_fetcher_forwards_browser_headers() {
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let ua = headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                format!("ua={ua}")
            }),
        );
        let addr = testutil::serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let mut r = req(format!("http://{addr}/"), None);
        r.headers
            .insert("User-Agent".to_string(), "Mozilla/5.0 (Test)".to_string());
        let resp = fetcher.fetch(&r).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text_lossy(), "ua=Mozilla/5.0 (Test)");
    }

    #[tokio::test]
    async fn local_fetcher_caps_body_bytes() {
        let app = Router::new().route(
            "/big",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "x".repeat(10_000)) }),
        );
        let addr = testutil::serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&req(format!("http://{addr}/big"), Some(1_000)))
            .await
            .unwrap();
        assert!(resp.truncated);
        assert_eq!(resp.bytes.len(), 1_000);
        assert_eq!(resp.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn local_fetcher_rejects_invalid_urls() {
        let fetcher = LocalFetcher::new().unwrap();
        let err = fetcher
            .fetch(&req("not a url".to_string(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_not_raised() {
        let app = Router::new().route(
            "/gone",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let addr = testutil::serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&req(format!("http://{addr}/gone"), None))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }
}
