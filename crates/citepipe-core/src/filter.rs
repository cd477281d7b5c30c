//! URL policy applied to every discovery strategy's output.
//!
//! Pure and order-preserving: rejects hosts that routinely block automated access and
//! URLs that look like authentication or commerce flows.

/// Hosts compared exactly (after lower-casing) against the parsed URL host.
pub const BLOCKED_DOMAINS: &[&str] = &[
    "reddit.com",
    "www.reddit.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "www.linkedin.com",
    "facebook.com",
    "www.facebook.com",
    "instagram.com",
    "www.instagram.com",
    "tiktok.com",
    "www.tiktok.com",
];

/// Substrings matched case-insensitively against the full URL text.
pub const SUSPICIOUS_PATTERNS: &[&str] = &["login", "signin", "register", "auth", "cart", "checkout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Not parseable as an absolute URL with a host.
    Unparseable,
    BlockedDomain,
    SuspiciousPattern(&'static str),
}

pub fn classify(raw: &str) -> Verdict {
    let Ok(parsed) = url::Url::parse(raw.trim()) else {
        return Verdict::Unparseable;
    };
    let Some(host) = parsed.host_str() else {
        return Verdict::Unparseable;
    };
    let host = host.to_ascii_lowercase();
    if BLOCKED_DOMAINS.contains(&host.as_str()) {
        return Verdict::BlockedDomain;
    }
    let lower = raw.to_lowercase();
    if let Some(p) = SUSPICIOUS_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Verdict::SuspiciousPattern(p);
    }
    Verdict::Allowed
}

pub fn is_allowed(raw: &str) -> bool {
    classify(raw) == Verdict::Allowed
}

/// Keep allowed URLs, in input order.
pub fn filter_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter(|u| is_allowed(u.as_ref()))
        .map(|u| u.as_ref().to_string())
        .collect()
}
