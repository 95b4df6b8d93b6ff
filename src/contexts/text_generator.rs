use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::GenerationError;

/// A model that can serve a generation task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
}

/// External text-in, text-out generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &Model,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn text(self) -> Option<String> {
        self.choices.into_iter().find_map(|choice| choice.message.content)
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTextGenerator {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiTextGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        // The orchestrator enforces its own deadline; this one only guards
        // against a connection that never returns.
        let http = Client::builder()
            .timeout(config.request_timeout() + Duration::from_secs(5))
            .user_agent(concat!("specforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &Model,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &model.name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let res = builder
            .send()
            .await
            .map_err(|e| GenerationError::Service(format!("request failed: {e}")))?;

        match res.status() {
            s if s.is_success() => res
                .json::<ChatResponse>()
                .await
                .map_err(|e| GenerationError::Service(format!("invalid response: {e}")))?
                .text()
                .ok_or_else(|| GenerationError::Service("no text content in response".to_string())),
            StatusCode::UNAUTHORIZED => {
                Err(GenerationError::Service("invalid api key".to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(GenerationError::Service("rate limited".to_string())),
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(GenerationError::Service(format!("http {}: {body}", s.as_u16())))
            }
        }
    }
}
