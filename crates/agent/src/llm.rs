use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dialroute_core::config::{LlmConfig, LlmProvider};
use dialroute_core::errors::ModelError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Builds the client selected by configuration; a disabled model yields [`DisabledLlmClient`].
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, ModelError> {
    if !config.enabled {
        return Ok(Arc::new(DisabledLlmClient));
    }
    Ok(Arc::new(HttpLlmClient::from_config(config)?))
}

/// Always fails with [`ModelError::Disabled`] so callers keep their deterministic result.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
        Err(ModelError::Disabled)
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 512;
const SYSTEM_PROMPT: &str =
    "Eres un clasificador de intenciones. Responde únicamente con un objeto JSON válido.";

pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ModelError::Transport(error.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn send_once(&self, prompt: &str) -> Result<String, ModelError> {
        let request = match self.provider {
            LlmProvider::OpenAi => self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key_value())
                .json(&OpenAiRequest {
                    model: &self.model,
                    temperature: 0.0,
                    max_tokens: MAX_COMPLETION_TOKENS,
                    messages: vec![
                        ChatMessage { role: "system", content: SYSTEM_PROMPT },
                        ChatMessage { role: "user", content: prompt },
                    ],
                }),
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key_value())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest {
                    model: &self.model,
                    max_tokens: MAX_COMPLETION_TOKENS,
                    system: SYSTEM_PROMPT,
                    messages: vec![ChatMessage { role: "user", content: prompt }],
                }),
            LlmProvider::Ollama => self
                .client
                .post(format!("{}/api/generate", self.base_url))
                .json(&OllamaRequest {
                    model: &self.model,
                    prompt,
                    system: SYSTEM_PROMPT,
                    stream: false,
                    format: "json",
                }),
        };

        let response = request.send().await.map_err(|error| self.map_transport(error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status: status.as_u16(), body });
        }

        let text = match self.provider {
            LlmProvider::OpenAi => response
                .json::<OpenAiResponse>()
                .await
                .map_err(|error| self.map_transport(error))?
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
            LlmProvider::Anthropic => {
                let body = response
                    .json::<AnthropicResponse>()
                    .await
                    .map_err(|error| self.map_transport(error))?;
                let joined = body
                    .content
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text)
                    .collect::<Vec<_>>()
                    .join("");
                Some(joined)
            }
            LlmProvider::Ollama => response
                .json::<OllamaResponse>()
                .await
                .map_err(|error| self.map_transport(error))?
                .response,
        };

        match text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ModelError::EmptyResponse),
        }
    }

    fn api_key_value(&self) -> &str {
        self.api_key.as_ref().map(|key| key.expose_secret()).unwrap_or_default()
    }

    fn map_transport(&self, error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout { timeout_ms: self.timeout.as_millis() as u64 }
        } else {
            ModelError::Transport(error.to_string())
        }
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn is_retryable(error: &ModelError) -> bool {
    match error {
        ModelError::Transport(_) => true,
        ModelError::Status { status, .. } => *status == 429 || *status >= 500,
        ModelError::Timeout { .. } | ModelError::EmptyResponse | ModelError::Disabled => false,
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => {
                    debug!(
                        event_name = "routing.llm.completed",
                        provider = self.provider.as_str(),
                        attempt,
                        "model completion received"
                    );
                    return Ok(text);
                }
                Err(error) if attempt < self.max_retries && is_retryable(&error) => {
                    warn!(
                        event_name = "routing.llm.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "model call failed; retrying"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
}
