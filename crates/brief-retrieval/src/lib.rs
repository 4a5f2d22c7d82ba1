//! Brief Retrieval - turns candidate URLs into usable documents
//!
//! - `robots`: robots.txt rules and the per-URL permission capability
//! - `fetcher`: HTTP page fetching with a body size limit
//! - `html`: HTML to plain text with `lol_html`
//! - `quality`: rejects stubs, filler and error pages
//! - `quota`: per-domain admission
//! - `retriever`: bounded-concurrency fan-out/fan-in over all of the above
//!
//! Every external collaborator sits behind a trait so runs can be
//! exercised without a network.

#![warn(unreachable_pub)]

pub mod error;
pub mod fetcher;
pub mod html;
pub mod quality;
pub mod quota;
pub mod retriever;
pub mod robots;

pub use error::FetchError;
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher};
pub use html::{clean_text, ContentExtractor, ExtractedContent, HtmlTextExtractor};
pub use quality::{QualityGate, QualityRejection};
pub use quota::DomainQuota;
pub use retriever::{FetchOptions, RetrievalBatch, Retriever};
pub use robots::{AllowAll, HttpRobotsPolicy, RobotsPolicy, RobotsRules};
