//! robots.txt policy
//!
//! - `RobotsRules`: parsed rule groups with longest-match evaluation
//! - `RobotsPolicy`: the capability the retriever consults per URL
//! - `HttpRobotsPolicy`: fetches `/robots.txt` once per origin and caches it
//!
//! A policy may be slow or hang; the retriever bounds every verdict with
//! its own timeout and treats silence as permission.

use crate::error::FetchError;
use async_trait::async_trait;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Decides whether a URL may be fetched
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    /// `Ok(true)` when crawling `url` is permitted
    async fn is_allowed(&self, url: &Url) -> Result<bool, FetchError>;
}

/// Permits everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn is_allowed(&self, _url: &Url) -> Result<bool, FetchError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    /// Rules that permit everything
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt text
    ///
    /// Unknown directives and malformed lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    let starts_new = current.as_ref().map_or(true, |g| !g.rules.is_empty());
                    if starts_new {
                        if let Some(done) = current.take() {
                            groups.push(done);
                        }
                        current = Some(Group::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    if value.is_empty() {
                        // An empty Disallow permits everything; record nothing.
                        continue;
                    }
                    group.rules.push(Rule {
                        allow: key == "allow",
                        pattern: value.to_string(),
                    });
                }
                _ => {}
            }
        }
        if let Some(done) = current {
            groups.push(done);
        }
        Self { groups }
    }

    /// Whether `agent` may fetch `path` (path plus optional `?query`)
    #[must_use]
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        let agent = agent.to_ascii_lowercase();
        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .collect();
        let groups = if specific.is_empty() {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect()
        } else {
            specific
        };

        let mut best: Option<(usize, bool)> = None;
        for rule in groups.iter().flat_map(|g| g.rules.iter()) {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow)) if best_len > len => Some((best_len, best_allow)),
                Some((best_len, best_allow)) if best_len == len => {
                    Some((best_len, best_allow || rule.allow))
                }
                _ => Some((len, rule.allow)),
            };
        }
        best.map_or(true, |(_, allow)| allow)
    }
}

/// robots.txt path pattern: `*` matches any run, trailing `$` anchors
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();
    let Some(first) = parts.first() else {
        return true;
    };
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate().skip(1) {
        if part.is_empty() {
            continue;
        }
        if anchored && i == last {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    if anchored && parts.last().is_some_and(|p| !p.is_empty()) {
        return pos == path.len();
    }
    true
}

/// Path and query as matched against rules
fn rule_path(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

/// robots.txt fetched over HTTP, cached per origin
#[derive(Debug, Clone)]
pub struct HttpRobotsPolicy {
    client: reqwest::Client,
    agent: String,
    cache: Cache<String, Arc<RobotsRules>>,
}

impl HttpRobotsPolicy {
    /// Create a policy matching rules for `agent`
    #[must_use]
    pub fn new(client: reqwest::Client, agent: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            cache: Cache::builder()
                .max_capacity(4_096)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),
        }
    }

    async fn rules_for(&self, url: &Url) -> Result<Arc<RobotsRules>, FetchError> {
        let origin = url.origin().ascii_serialization();
        let robots_url = format!("{origin}/robots.txt");
        cached_rules(&self.cache, origin, self.download(robots_url)).await
    }

    async fn download(&self, robots_url: String) -> Result<Arc<RobotsRules>, FetchError> {
        let response = self.client.get(&robots_url).send().await?;
        let status = response.status();
        let rules = if status.is_success() {
            RobotsRules::parse(&response.text().await?)
        } else {
            // Missing or erroring robots.txt imposes no restrictions.
            tracing::debug!(%robots_url, status = status.as_u16(), "no usable robots.txt");
            RobotsRules::allow_all()
        };
        Ok(Arc::new(rules))
    }
}

/// Rules for `origin`, loading them on a miss
///
/// Concurrent misses for one origin wait on a single `load`; errors are
/// not cached.
async fn cached_rules<F>(
    cache: &Cache<String, Arc<RobotsRules>>,
    origin: String,
    load: F,
) -> Result<Arc<RobotsRules>, FetchError>
where
    F: Future<Output = Result<Arc<RobotsRules>, FetchError>>,
{
    cache
        .try_get_with(origin, load)
        .await
        .map_err(|err| FetchError::clone(&err))
}

#[async_trait]
impl RobotsPolicy for HttpRobotsPolicy {
    async fn is_allowed(&self, url: &Url) -> Result<bool, FetchError> {
        let rules = self.rules_for(url).await?;
        Ok(rules.is_allowed(&self.agent, &rule_path(url)))
    }
}
