//! Process configuration, read once at startup and passed into every component.

use citepipe_core::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SEARXNG_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_GOOGLE_CSE_ID: &str = "c07d6b77b2e584cc9";
pub const DEFAULT_GOOGLE_CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_APIFY_BASE_URL: &str = "https://api.apify.com";
pub const DEFAULT_APIFY_ACTOR: &str = "apify~website-content-crawler";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First non-blank value among `keys`.
fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env(k))
}

fn env_ms(key: &str, default: Duration) -> Duration {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

const GEMINI_API_KEY_VARS: &[&str] = &["CITEPIPE_GEMINI_API_KEY", "GOOGLE_API_KEY"];
const APIFY_API_TOKEN_VARS: &[&str] = &["CITEPIPE_APIFY_API_TOKEN", "APIFY_API_TOKEN"];
const SEARXNG_BASE_URL_VARS: &[&str] = &["CITEPIPE_SEARXNG_BASE_URL", "SEARXNG_BASE_URL"];
const GOOGLE_SEARCH_KEY_VARS: &[&str] = &["CITEPIPE_GOOGLE_SEARCH_API_KEY"];
const GOOGLE_CSE_ID_VARS: &[&str] = &["CITEPIPE_GOOGLE_CSE_ID", "GOOGLE_CSE_ID"];

#[derive(Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub apify_api_token: String,
    pub apify_base_url: String,
    pub apify_actor: String,
    pub searxng_base_url: String,
    /// Key for the managed search API; defaults to the generation key.
    pub google_search_api_key: String,
    pub google_cse_id: String,
    pub google_cse_endpoint: String,
    pub search_timeout: Duration,
    /// Wall-clock ceiling for one batch crawl job (submit + wait).
    pub crawl_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Randomized pause between sequential direct fetches.
    pub fetch_delay_min: Duration,
    pub fetch_delay_max: Duration,
    pub generation_timeout: Duration,
}

impl Config {
    /// Defaults for everything except the two required credentials.
    pub fn new(gemini_api_key: impl Into<String>, apify_api_token: impl Into<String>) -> Self {
        let gemini_api_key = gemini_api_key.into();
        Self {
            google_search_api_key: gemini_api_key.clone(),
            gemini_api_key,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            apify_api_token: apify_api_token.into(),
            apify_base_url: DEFAULT_APIFY_BASE_URL.to_string(),
            apify_actor: DEFAULT_APIFY_ACTOR.to_string(),
            searxng_base_url: DEFAULT_SEARXNG_BASE_URL.to_string(),
            google_cse_id: DEFAULT_GOOGLE_CSE_ID.to_string(),
            google_cse_endpoint: DEFAULT_GOOGLE_CSE_ENDPOINT.to_string(),
            search_timeout: Duration::from_secs(30),
            crawl_timeout: Duration::from_secs(600),
            fetch_timeout: Duration::from_secs(30),
            fetch_delay_min: Duration::from_secs(1),
            fetch_delay_max: Duration::from_secs(3),
            generation_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_env() -> Result<Self> {
        let gemini_api_key = env_any(GEMINI_API_KEY_VARS).ok_or_else(|| {
            Error::NotConfigured("missing CITEPIPE_GEMINI_API_KEY (or GOOGLE_API_KEY)".to_string())
        })?;
        let apify_api_token = env_any(APIFY_API_TOKEN_VARS).ok_or_else(|| {
            Error::NotConfigured(
                "missing CITEPIPE_APIFY_API_TOKEN (or APIFY_API_TOKEN)".to_string(),
            )
        })?;

        let mut cfg = Self::new(gemini_api_key, apify_api_token);
        if let Some(v) = env_any(SEARXNG_BASE_URL_VARS) {
            cfg.searxng_base_url = v;
        }
        if let Some(v) = env_any(GOOGLE_SEARCH_KEY_VARS) {
            cfg.google_search_api_key = v;
        }
        if let Some(v) = env_any(GOOGLE_CSE_ID_VARS) {
            cfg.google_cse_id = v;
        }
        if let Some(v) = env("CITEPIPE_GOOGLE_CSE_ENDPOINT") {
            cfg.google_cse_endpoint = v;
        }
        if let Some(v) = env("CITEPIPE_GEMINI_MODEL") {
            cfg.gemini_model = v;
        }
        if let Some(v) = env("CITEPIPE_GEMINI_BASE_URL") {
            cfg.gemini_base_url = v;
        }
        if let Some(v) = env("CITEPIPE_APIFY_BASE_URL") {
            cfg.apify_base_url = v;
        }
        if let Some(v) = env("CITEPIPE_APIFY_ACTOR") {
            cfg.apify_actor = v;
        }
        cfg.search_timeout = env_ms("CITEPIPE_SEARCH_TIMEOUT_MS", cfg.search_timeout);
        cfg.crawl_timeout = env_ms("CITEPIPE_CRAWL_TIMEOUT_MS", cfg.crawl_timeout);
        cfg.fetch_timeout = env_ms("CITEPIPE_FETCH_TIMEOUT_MS", cfg.fetch_timeout);
        cfg.fetch_delay_min = env_ms("CITEPIPE_FETCH_DELAY_MIN_MS", cfg.fetch_delay_min);
        cfg.fetch_delay_max = env_ms("CITEPIPE_FETCH_DELAY_MAX_MS", cfg.fetch_delay_max);
        cfg.generation_timeout =
            env_ms("CITEPIPE_GENERATION_TIMEOUT_MS", cfg.generation_timeout);
        Ok(cfg)
    }
}

// Credentials never reach logs through `{:?}`.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("apify_api_token", &"<redacted>")
            .field("apify_base_url", &self.apify_base_url)
            .field("apify_actor", &self.apify_actor)
            .field("searxng_base_url", &self.searxng_base_url)
            .field("google_search_api_key", &"<redacted>")
            .field("google_cse_id", &self.google_cse_id)
            .field("google_cse_endpoint", &self.google_cse_endpoint)
            .field("search_timeout", &self.search_timeout)
            .field("crawl_timeout", &self.crawl_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("fetch_delay_min", &self.fetch_delay_min)
            .field("fetch_delay_max", &self.fetch_delay_max)
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

/// What is configured, booleans only for secrets. Does not require a valid `Config`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub searxng_base_url: String,
    pub generation_configured: bool,
    pub crawl_configured: bool,
    pub google_search_configured: bool,
}

impl ConfigStatus {
    pub fn from_env() -> Self {
        let generation_configured = env_any(GEMINI_API_KEY_VARS).is_some();
        Self {
            searxng_base_url: env_any(SEARXNG_BASE_URL_VARS)
                .unwrap_or_else(|| DEFAULT_SEARXNG_BASE_URL.to_string()),
            generation_configured,
            crawl_configured: env_any(APIFY_API_TOKEN_VARS).is_some(),
            google_search_configured: generation_configured
                || env_any(GOOGLE_SEARCH_KEY_VARS).is_some(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            searxng_base_url: cfg.searxng_base_url.clone(),
            generation_configured: !cfg.gemini_api_key.is_empty(),
            crawl_configured: !cfg.apify_api_token.is_empty(),
            google_search_configured: !cfg.google_search_api_key.is_empty(),
        }
    }

    /// Both required credentials are present.
    pub fn ready(&self) -> bool {
        self.generation_configured && self.crawl_configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }

        fn unset(k: &'static str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::remove_var(k);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    #[test]
    fn missing_credentials_refuse_to_build() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::set("CITEPIPE_GEMINI_API_KEY", "  ");
        let _g2 = EnvGuard::unset("GOOGLE_API_KEY");
        let _g3 = EnvGuard::set("CITEPIPE_APIFY_API_TOKEN", "tok");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
        assert!(err.to_string().contains("GEMINI"));

        let _g4 = EnvGuard::set("GOOGLE_API_KEY", "g");
        let _g5 = EnvGuard::unset("CITEPIPE_APIFY_API_TOKEN");
        let _g6 = EnvGuard::unset("APIFY_API_TOKEN");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("APIFY"));
    }

    #[test]
    fn from_env_applies_defaults_and_aliases() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::unset("CITEPIPE_GEMINI_API_KEY");
        let _g2 = EnvGuard::set("GOOGLE_API_KEY", "gkey");
        let _g3 = EnvGuard::set("APIFY_API_TOKEN", "atok");
        let _g4 = EnvGuard::unset("CITEPIPE_SEARXNG_BASE_URL");
        let _g5 = EnvGuard::unset("SEARXNG_BASE_URL");
        let _g6 = EnvGuard::unset("CITEPIPE_GOOGLE_SEARCH_API_KEY");
        let _g7 = EnvGuard::set("CITEPIPE_FETCH_DELAY_MAX_MS", "250");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.gemini_api_key, "gkey");
        assert_eq!(cfg.apify_api_token, "atok");
        assert_eq!(cfg.google_search_api_key, "gkey");
        assert_eq!(cfg.searxng_base_url, DEFAULT_SEARXNG_BASE_URL);
        assert_eq!(cfg.fetch_delay_max, Duration::from_millis(250));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let cfg = Config::new("super-secret-key", "super-secret-token");
        let s = format!("{cfg:?}");
        assert!(!s.contains("super-secret"));
        assert!(s.contains("<redacted>"));
    }

    #[test]
    fn status_reports_booleans_only() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::unset("CITEPIPE_GEMINI_API_KEY");
        let _g2 = EnvGuard::unset("GOOGLE_API_KEY");
        let _g3 = EnvGuard::set("CITEPIPE_APIFY_API_TOKEN", "secret");
        let _g4 = EnvGuard::unset("CITEPIPE_GOOGLE_SEARCH_API_KEY");
        let st = ConfigStatus::from_env();
        assert!(!st.generation_configured);
        assert!(st.crawl_configured);
        assert!(!st.google_search_configured);
        assert!(!st.ready());
        let js = serde_json::to_string(&st).unwrap();
        assert!(!js.contains("secret"));
    }
}
