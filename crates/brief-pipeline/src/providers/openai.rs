//! OpenAI-compatible chat completions (OpenRouter, vLLM, Ollama, ...)

use crate::collaborators::{CompletionClient, CompletionRequest};
use crate::error::ProviderError;
use async_trait::async_trait;
use brief_core::CompletionConfig;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// `/chat/completions` client
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleClient {
    /// Build from config; the API key is read from `config.api_key_env`
    pub fn new(config: &CompletionConfig) -> Result<Self, ProviderError> {
        let endpoint = endpoint(&config.base_url)?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "no completion api key set; sending unauthenticated requests");
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// With an explicit API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

fn endpoint(base_url: &str) -> Result<Url, ProviderError> {
    Url::parse(&format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .map_err(|e| ProviderError::Config(format!("invalid completion base url {base_url:?}: {e}")))
}

/// First choice's message text
fn parse_chat_response(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| ProviderError::InvalidResponse("response has no message content".into()))
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        };

        let mut call = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }
        let text = response.text().await?;
        parse_chat_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_path() {
        assert_eq!(
            endpoint("https://openrouter.ai/api/v1/").map(|u| u.to_string()),
            Ok("https://openrouter.ai/api/v1/chat/completions".to_string())
        );
        assert!(matches!(endpoint("not a url"), Err(ProviderError::Config(_))));
    }

    #[test]
    fn reads_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"queries\":[]}"}}]}"#;
        assert_eq!(parse_chat_response(body), Ok("{\"queries\":[]}".to_string()));
    }

    #[test]
    fn empty_choices_are_invalid() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_chat_response("<html>bad gateway</html>"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
