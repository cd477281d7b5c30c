//! Answer synthesis: one generation call over the first few documents.

use citepipe_core::{
    truncate_chars, Citation, Document, PipelineError, TextGenerator, SNIPPET_CHARS,
    SYNTHESIS_EXCERPT_CHARS, SYNTHESIS_MAX_DOCUMENTS,
};
use std::fmt::Write as _;
use tracing::info;

const UNTITLED: &str = "Untitled Source";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub sources: Vec<String>,
}

/// Prompt over `docs`, which the caller has already capped.
pub fn build_prompt(query: &str, docs: &[Document]) -> String {
    let mut sources = String::new();
    for (i, d) in docs.iter().enumerate() {
        let (excerpt, _) = truncate_chars(&d.content, SYNTHESIS_EXCERPT_CHARS);
        let _ = write!(sources, "\n\n--- Source {}: {} ---\n{}", i + 1, d.title, excerpt);
    }
    format!(
        "Based on the following sources, provide a comprehensive answer to this question: {query}\n\
         \n\
         Requirements:\n\
         1. Synthesize information from multiple sources\n\
         2. Provide specific details and examples\n\
         3. Structure your response clearly\n\
         4. Mention which sources support key points\n\
         \n\
         Sources:{sources}\n\
         \n\
         Question: {query}\n\
         \n\
         Please provide a detailed, well-structured answer:"
    )
}

/// One citation per document, ids from 1 in input order.
pub fn citations_for(docs: &[Document]) -> Vec<Citation> {
    docs.iter()
        .enumerate()
        .map(|(i, d)| {
            let (mut snippet, cut) = truncate_chars(&d.content, SNIPPET_CHARS);
            if cut {
                snippet.push_str("...");
            }
            let title = match d.title.trim() {
                "" => UNTITLED.to_string(),
                t => t.to_string(),
            };
            Citation {
                id: i + 1,
                url: d.url.clone(),
                title,
                snippet,
            }
        })
        .collect()
}

pub fn sources_for(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .filter(|d| !d.url.is_empty())
        .map(|d| d.url.clone())
        .collect()
}

pub struct Synthesizer {
    generator: Box<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        docs: &[Document],
    ) -> Result<Synthesis, PipelineError> {
        if docs.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let used = &docs[..docs.len().min(SYNTHESIS_MAX_DOCUMENTS)];
        let prompt = build_prompt(query, used);

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::SynthesisFailed(e.to_string()))?;
        if answer.trim().is_empty() {
            return Err(PipelineError::SynthesisFailed(
                "generator returned an empty answer".to_string(),
            ));
        }

        let citations = citations_for(used);
        info!(
            generator = self.generator.name(),
            documents = docs.len(),
            citations = citations.len(),
            "synthesis complete"
        );
        Ok(Synthesis {
            answer,
            citations,
            sources: sources_for(used),
        })
    }
}
