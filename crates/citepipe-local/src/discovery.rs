//! Source discovery: an ordered list of search strategies, tried until one answers.

use crate::config::Config;
use crate::search::{GoogleCseProvider, ReferenceSiteProvider, SearxngSearchProvider};
use citepipe_core::filter::filter_urls;
use citepipe_core::{PipelineError, ProviderFailure, SearchProvider, SearchQuery};
use tracing::{info, warn};

/// URLs produced by the first strategy that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub urls: Vec<String>,
    pub provider: String,
}

pub struct Discovery {
    strategies: Vec<Box<dyn SearchProvider>>,
}

impl Discovery {
    pub fn new(strategies: Vec<Box<dyn SearchProvider>>) -> Self {
        Self { strategies }
    }

    /// SearXNG, then Google Custom Search, then templated reference sites.
    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Self {
        Self::new(vec![
            Box::new(SearxngSearchProvider::new(client.clone(), cfg)),
            Box::new(GoogleCseProvider::new(client, cfg)),
            Box::new(ReferenceSiteProvider),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns at most `limit` filtered URLs from a single strategy.
    ///
    /// A strategy that returns without error ends the search, even with zero results;
    /// the caller decides what an empty list means.
    pub async fn discover(&self, query: &str, limit: usize) -> Result<Discovered, PipelineError> {
        let limit = limit.max(1);
        let q = SearchQuery::new(query, limit);
        let mut causes = Vec::new();

        for strategy in &self.strategies {
            let provider = strategy.name();
            match strategy.search(&q).await {
                Ok(resp) => {
                    let raw: Vec<String> = resp
                        .results
                        .into_iter()
                        .map(|r| r.url)
                        .take(limit)
                        .collect();
                    let urls = filter_urls(&raw);
                    info!(
                        provider,
                        found = raw.len(),
                        kept = urls.len(),
                        "discovery complete"
                    );
                    return Ok(Discovered {
                        urls,
                        provider: provider.to_string(),
                    });
                }
                Err(e) => {
                    warn!(provider, error = %e, "search strategy failed; trying next");
                    causes.push(ProviderFailure {
                        provider: provider.to_string(),
                        cause: e.to_string(),
                    });
                }
            }
        }

        Err(PipelineError::DiscoveryExhausted { causes })
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeSearch;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn first_successful_strategy_wins_and_later_ones_are_not_called() {
        let a = FakeSearch::failing("a");
        let b = FakeSearch::ok("b", vec!["https://b.example/1", "https://b.example/2"]);
        let c = FakeSearch::ok("c", vec!["https://c.example/1"]);
        let (a_calls, b_calls, c_calls) = (a.calls.clone(), b.calls.clone(), c.calls.clone());
        let d = Discovery::new(vec![Box::new(a), Box::new(b), Box::new(c)]);

        let got = d.discover("q", 5).await.unwrap();
        assert_eq!(got.provider, "b");
        assert_eq!(got.urls, vec!["https://b.example/1", "https://b.example/2"]);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn output_is_bounded_and_filtered() {
        let s = FakeSearch::ok(
            "s",
            vec![
                "https://www.reddit.com/r/economics",
                "https://example.com/1",
                "https://example.com/login",
                "https://example.com/2",
                "https://example.com/3",
            ],
        );
        let d = Discovery::new(vec![Box::new(s)]);
        for k in 1..=6 {
            let got = d.discover("q", k).await.unwrap();
            assert!(got.urls.len() <= k, "k={k} got={:?}", got.urls);
        }
        let got = d.discover("q", 4).await.unwrap();
        assert_eq!(got.urls, vec!["https://example.com/1", "https://example.com/2"]);
    }

    #[tokio::test]
    async fn empty_success_does_not_fall_through() {
        let a = FakeSearch::ok("a", vec!["https://x.com/only-blocked"]);
        let b = FakeSearch::ok("b", vec!["https://example.com/1"]);
        let b_calls = b.calls.clone();
        let d = Discovery::new(vec![Box::new(a), Box::new(b)]);
        let got = d.discover("q", 3).await.unwrap();
        assert!(got.urls.is_empty());
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_strategies_failing_reports_every_cause() {
        let d = Discovery::new(vec![
            Box::new(FakeSearch::failing("searxng")),
            Box::new(FakeSearch::failing("google_cse")),
            Box::new(FakeSearch::failing("reference_sites")),
        ]);
        let err = d.discover("q", 3).await.unwrap_err();
        let PipelineError::DiscoveryExhausted { causes } = err else {
            panic!("expected DiscoveryExhausted");
        };
        let names: Vec<&str> = causes.iter().map(|c| c.provider.as_str()).collect();
        assert_eq!(names, vec!["searxng", "google_cse", "reference_sites"]);
        assert!(causes[1].cause.contains("google_cse unavailable"));
    }

    #[test]
    fn default_strategy_order() {
        let d = Discovery::from_config(reqwest::Client::new(), &Config::new("k", "t"));
        assert_eq!(
            d.strategy_names(),
            vec!["searxng", "google_cse", "reference_sites"]
        );
    }
}
