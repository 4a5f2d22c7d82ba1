//! HTTP-backed collaborators

mod openai;
mod searxng;

pub use openai::OpenAiCompatibleClient;
pub use searxng::SearxngSearch;
