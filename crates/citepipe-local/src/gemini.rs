//! Gemini `generateContent` text backend.
//!
//! One non-streaming call per prompt. The API key travels in the `x-goog-api-key`
//! header so it never shows up in URLs or in reqwest error messages.

use crate::config::Config;
use citepipe_core::{Error, Result, TextGenerator};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ReqPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ReqContent {
    parts: Vec<ReqPart>,
}

#[derive(Debug, Serialize)]
struct GeminiReq {
    contents: Vec<ReqContent>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.gemini_api_key.clone(),
            model: cfg.gemini_model.clone(),
            base_url: cfg.gemini_base_url.trim_end_matches('/').to_string(),
            timeout: cfg.generation_timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Joined text of `candidates[0].content.parts[*].text`.
fn first_candidate_text(v: &serde_json::Value) -> String {
    let mut out = String::new();
    let parts = v
        .get("candidates")
        .and_then(|x| x.as_array())
        .and_then(|c| c.first())
        .and_then(|c0| c0.get("content"))
        .and_then(|x| x.get("parts"))
        .and_then(|x| x.as_array());
    for p in parts.into_iter().flatten() {
        if let Some(t) = p.get("text").and_then(|x| x.as_str()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    out
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let req = GeminiReq {
            contents: vec![ReqContent {
                parts: vec![ReqPart {
                    text: prompt.to_string(),
                }],
            }],
        };
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "calling gemini");

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let (body, _) = citepipe_core::truncate_chars(body.trim(), 200);
            return Err(Error::Llm(format!("gemini HTTP {status}: {body}")));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Llm(format!("gemini returned invalid JSON: {e}")))?;
        let text = first_candidate_text(&v);
        if text.trim().is_empty() {
            return Err(Error::Llm("gemini returned no text".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };

    fn client_for(addr: std::net::SocketAddr) -> GeminiClient {
        let mut cfg = Config::new("secret-key", "t");
        cfg.gemini_base_url = format!("http://{addr}/");
        GeminiClient::new(reqwest::Client::new(), &cfg)
    }

    #[test]
    fn joins_parts_of_the_first_candidate() {
        let v = serde_json::json!({
            "candidates": [
                {"content": {"parts": [{"text": "Inflation is"}, {"text": "a price rise."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        });
        assert_eq!(first_candidate_text(&v), "Inflation is\na price rise.");
        assert_eq!(first_candidate_text(&serde_json::json!({})), "");
    }

    #[tokio::test]
    async fn sends_prompt_with_key_header() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(
                |Path(call): Path<String>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(call, "gemini-1.5-flash:generateContent");
                    assert_eq!(
                        headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()),
                        Some("secret-key")
                    );
                    let prompt = body["contents"][0]["parts"][0]["text"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    Json(serde_json::json!({
                        "candidates": [{"content": {"parts": [{"text": format!("echo: {prompt}")}]}}]
                    }))
                },
            ),
        );
        let addr = serve(app).await;
        let out = client_for(addr).generate("what is inflation?").await.unwrap();
        assert_eq!(out, "echo: what is inflation?");
    }

    #[tokio::test]
    async fn blank_output_is_an_error() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(|| async {
                Json(serde_json::json!({
                    "candidates": [{"content": {"parts": [{"text": "   "}]}}]
                }))
            }),
        );
        let addr = serve(app).await;
        let err = client_for(addr).generate("q").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn http_error_does_not_leak_the_key() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
        );
        let addr = serve(app).await;
        let msg = client_for(addr).generate("q").await.unwrap_err().to_string();
        assert!(msg.contains("429") && msg.contains("quota exceeded"), "{msg}");
        assert!(!msg.contains("secret-key"));
    }
}
