//! Discover → extract → synthesize, one query at a time.

use crate::config::Config;
use crate::discovery::Discovery;
use crate::extraction::Extraction;
use crate::gemini::GeminiClient;
use crate::synthesis::Synthesizer;
use citepipe_core::{PipelineError, PipelineResult, ResearchQuery, Result, Stage};
use std::time::Instant;
use tracing::{info, warn};

pub struct ResearchPipeline {
    discovery: Discovery,
    extraction: Extraction,
    synthesizer: Synthesizer,
}

impl ResearchPipeline {
    pub fn new(discovery: Discovery, extraction: Extraction, synthesizer: Synthesizer) -> Self {
        Self {
            discovery,
            extraction,
            synthesizer,
        }
    }

    /// Production wiring: SearXNG/Google CSE/reference sites, Apify with direct fetch, Gemini.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = crate::http_client()?;
        Ok(Self::new(
            Discovery::from_config(client.clone(), cfg),
            Extraction::from_config(client.clone(), cfg),
            Synthesizer::new(Box::new(GeminiClient::new(client, cfg))),
        ))
    }

    pub async fn research(
        &self,
        q: &ResearchQuery,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let t0 = Instant::now();
        info!(query = %q.query, max_results = q.max_results, "research started");

        let found = self.discovery.discover(&q.query, q.max_results).await?;
        if found.urls.is_empty() {
            warn!(provider = %found.provider, stage = %Stage::Discover, "no usable URLs");
            return Err(PipelineError::NoSourcesFound);
        }
        info!(stage = %Stage::Discover, provider = %found.provider, urls = found.urls.len(), "stage done");

        let docs = self.extraction.extract(&found.urls).await?;
        if docs.is_empty() {
            return Err(PipelineError::ExtractionExhausted {
                crawl: "no documents".to_string(),
                fallback: "no documents".to_string(),
            });
        }
        info!(stage = %Stage::Extract, documents = docs.len(), "stage done");

        let synthesis = self.synthesizer.synthesize(&q.query, &docs).await?;
        info!(
            stage = %Stage::Done,
            citations = synthesis.citations.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "research complete"
        );

        Ok(PipelineResult {
            query: q.query.clone(),
            answer: synthesis.answer,
            citations: synthesis.citations,
            sources: synthesis.sources,
            total_documents: docs.len(),
            provider: found.provider,
        })
    }
}
