//! Testing utilities for the Brief workspace
//!
//! Scripted collaborators and fixtures shared by integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use brief_core::{normalize_url_str, SearchResult};
use brief_pipeline::{CompletionClient, CompletionRequest, Critic, PromptKind, ProviderError, SearchProvider};
use brief_retrieval::{FetchError, FetchedPage, PageFetcher, RobotsPolicy};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub use brief_core::ProgressLog as RecordingSink;

/// Scripted answer to a completion call
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ProviderError),
}

/// Completion backend that answers from per-kind scripts
///
/// One-shot replies queued with `then` are used first, in order; after
/// that the kind's `respond` reply repeats. Unscripted kinds get `""`.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    queued: Mutex<HashMap<PromptKind, VecDeque<Reply>>>,
    standing: Mutex<HashMap<PromptKind, Reply>>,
    fallback: Option<Reply>,
    calls: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails as if the backend were down
    pub fn unreachable() -> Self {
        Self {
            fallback: Some(Reply::Fail(ProviderError::Unreachable("connection refused".into()))),
            ..Self::default()
        }
    }

    /// Standing reply for `kind`
    pub fn respond(self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.standing.lock().insert(kind, Reply::Text(text.into()));
        self
    }

    /// Standing failure for `kind`
    pub fn fail(self, kind: PromptKind, err: ProviderError) -> Self {
        self.standing.lock().insert(kind, Reply::Fail(err));
        self
    }

    /// One-shot reply for the next unanswered call of `kind`
    pub fn then(self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.queued
            .lock()
            .entry(kind)
            .or_default()
            .push_back(Reply::Text(text.into()));
        self
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.calls.lock().iter().filter(|r| r.kind == kind).count()
    }

    fn next_reply(&self, kind: PromptKind) -> Reply {
        if let Some(reply) = self.queued.lock().get_mut(&kind).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = self.standing.lock().get(&kind) {
            return reply.clone();
        }
        self.fallback.clone().unwrap_or(Reply::Text(String::new()))
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_reply(request.kind) {
            Reply::Text(text) => Ok(text),
            Reply::Fail(err) => Err(err),
        }
    }
}

/// Critic with a fixed verdict
#[derive(Debug, Default)]
pub struct ScriptedCritic {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedCritic {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn critique(&self, _topic: &str, _report_text: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Search backend with canned results
#[derive(Debug, Default)]
pub struct StaticSearch {
    by_query: HashMap<String, Vec<String>>,
    default: Vec<String>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs returned for any query without its own entry
    pub fn with_default(mut self, urls: &[&str]) -> Self {
        self.default = urls.iter().map(|u| (*u).to_string()).collect();
        self
    }

    /// URLs returned for `query` (case-insensitive)
    pub fn with_results(mut self, query: &str, urls: &[&str]) -> Self {
        self.by_query
            .insert(query.to_lowercase(), urls.iter().map(|u| (*u).to_string()).collect());
        self
    }

    /// Every search fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, ProviderError> {
        self.queries.lock().push(query.to_string());
        if self.failing {
            return Err(ProviderError::Http { status: 503 });
        }
        let urls = self.by_query.get(&query.to_lowercase()).unwrap_or(&self.default);
        Ok(urls
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, url)| SearchResult::new(url.clone(), format!("Result {}", i + 1), i as u32 + 1))
            .collect())
    }
}

#[derive(Debug, Clone)]
enum PageScript {
    Html(String),
    Status(u16),
    Hang,
}

/// Fetcher serving pages from memory; unknown URLs are 404
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, PageScript>,
    fetched: Mutex<Vec<String>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(key(url), PageScript::Html(html.into()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(key(url), PageScript::Status(status));
        self
    }

    /// Fetching `url` never completes
    pub fn hanging(mut self, url: &str) -> Self {
        self.pages.insert(key(url), PageScript::Hang);
        self
    }

    /// Sleep this long inside every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    /// Most fetches ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn key(url: &str) -> String {
    normalize_url_str(url).unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let url_key = key(url.as_str());
        self.fetched.lock().push(url_key.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = match self.pages.get(&url_key) {
            Some(PageScript::Html(html)) => Ok(FetchedPage::html(url.clone(), html.clone())),
            Some(PageScript::Status(status)) => Err(FetchError::HttpStatus { status: *status }),
            Some(PageScript::Hang) => std::future::pending().await,
            None => Err(FetchError::HttpStatus { status: 404 }),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// robots.txt lookup that never answers for the listed hosts
#[derive(Debug, Default)]
pub struct HangingRobots {
    hosts: Option<HashSet<String>>,
}

impl HangingRobots {
    /// Hangs for every URL
    pub fn all() -> Self {
        Self { hosts: None }
    }

    /// Hangs for these hosts only; others are allowed at once
    pub fn for_hosts(hosts: &[&str]) -> Self {
        Self {
            hosts: Some(hosts.iter().map(|h| h.to_ascii_lowercase()).collect()),
        }
    }
}

#[async_trait]
impl RobotsPolicy for HangingRobots {
    async fn is_allowed(&self, url: &Url) -> Result<bool, FetchError> {
        let host = url.host_str().unwrap_or_default();
        match &self.hosts {
            Some(hosts) if !hosts.contains(host) => Ok(true),
            _ => std::future::pending().await,
        }
    }
}

/// robots.txt lookup that disallows URLs under the given prefixes
#[derive(Debug, Default)]
pub struct DenyRobots {
    prefixes: Vec<String>,
}

impl DenyRobots {
    pub fn prefixes(prefixes: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

#[async_trait]
impl RobotsPolicy for DenyRobots {
    async fn is_allowed(&self, url: &Url) -> Result<bool, FetchError> {
        Ok(!self.prefixes.iter().any(|p| url.as_str().starts_with(p.as_str())))
    }
}

const VOCABULARY: &[&str] = &[
    "research", "cells", "anode", "cathode", "lithium", "sodium", "energy", "density", "cycle",
    "lifetime", "charging", "thermal", "stability", "electrolyte", "ceramic", "polymer",
    "interface", "dendrite", "growth", "pressure", "capacity", "voltage", "current", "module",
    "pack", "vehicle", "grid", "storage", "supply", "chain", "cost", "kilowatt", "hour",
    "manufacturing", "yield", "pilot", "line", "scale", "market", "forecast", "decade",
    "laboratory", "prototype", "sample", "measurement", "report", "analysis", "industry",
    "partner", "startup", "investment", "patent", "material", "sulfide", "oxide", "coating",
    "separator", "safety", "performance", "efficiency",
];

/// Article page with `words` words of body text, wrapped in navigation
/// and script noise the extractor must skip
pub fn article_html(title: &str, words: usize) -> String {
    let body: Vec<String> = (0..words)
        .map(|i| {
            if i % 2 == 0 {
                VOCABULARY[(i / 2) % VOCABULARY.len()].to_string()
            } else {
                format!("n{i}")
            }
        })
        .collect();
    let paragraphs: Vec<String> = body
        .chunks(40)
        .map(|chunk| format!("<p>{}.</p>", chunk.join(" ")))
        .collect();
    format!(
        "<!doctype html><html lang=\"en\"><head><title>{title}</title>\
         <script>window.tracking = true;</script></head><body>\
         <nav><a href=\"/\">Home</a><a href=\"/about\">About</a></nav>\
         <article><h1>{title}</h1>{}</article>\
         <footer>Footer links</footer></body></html>",
        paragraphs.join("")
    )
}
