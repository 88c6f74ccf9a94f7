//! Client for an OpenAI-compatible inference server (vLLM)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::tool_use::{ChatMessage, Tool};
use crate::config::ModelConfig;

/// Sampling settings sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    /// vLLM extension, not part of the OpenAI schema
    pub top_k: i32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        ModelConfig::default().sampling()
    }
}

/// Token accounting returned by the server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One assistant turn from `/chat/completions`
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Error type for chat operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Empty response from model server")]
    EmptyResponse,

    #[error("No models available on the model server")]
    NoModels,
}

/// The seam the agent loop and the direct answerer talk through
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tools: Option<&[Tool]>,
        sampling: &SamplingParams,
    ) -> Result<ChatResponse, ChatError>;

    /// One text per prompt, in prompt order
    async fn complete(
        &self,
        prompts: &[String],
        model: &str,
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, ChatError>;
}

/// Client for `/v1/chat/completions`, `/v1/completions` and `/v1/models`
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a client with reqwest's default connection settings
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client with a sized connection pool and timeouts
    ///
    /// The per-request timeout bounds a single model call; the agent applies
    /// its own deadline to the whole multi-turn run.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout())
            .build()?;

        Ok(Self {
            base_url: trim_base_url(config.base_url.clone()),
            api_key: config.api_key.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the ids of served models
    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let endpoint = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let list: ModelList = read_json(response).await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Use the configured model name, or the first model the server lists
    pub async fn resolve_model(&self, configured: Option<&str>) -> Result<String, ChatError> {
        if let Some(name) = configured.filter(|n| !n.trim().is_empty()) {
            return Ok(name.to_string());
        }
        self.list_models()
            .await?
            .into_iter()
            .next()
            .ok_or(ChatError::NoModels)
    }

    /// Send a chat request with optional tools
    ///
    /// # Arguments
    /// * `messages` - The conversation history
    /// * `model` - Served model name
    /// * `tools` - Optional list of tools the model can use
    /// * `sampling` - Sampling settings
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tools: Option<&[Tool]>,
        sampling: &SamplingParams,
    ) -> Result<ChatResponse, ChatError> {
        let endpoint = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
            "top_k": sampling.top_k,
            "presence_penalty": sampling.presence_penalty,
            "frequency_penalty": sampling.frequency_penalty,
        });

        if let Some(t) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = serde_json::to_value(t)?;
            body["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let completion: ChatCompletionBody = read_json(response).await?;
        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion usage"
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ChatError::EmptyResponse)?;

        Ok(ChatResponse {
            message: choice.message,
            finish_reason: choice.finish_reason,
            usage: completion.usage,
        })
    }

    /// Plain text completion for a batch of already-formatted prompts
    ///
    /// Returns one text per prompt, in prompt order.
    pub async fn complete(
        &self,
        prompts: &[String],
        model: &str,
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, ChatError> {
        let endpoint = format!("{}/completions", self.base_url);

        let body = json!({
            "model": model,
            "prompt": prompts,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
            "top_k": sampling.top_k,
            "presence_penalty": sampling.presence_penalty,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let completion: CompletionBody = read_json(response).await?;
        if completion.choices.len() != prompts.len() {
            return Err(ChatError::EmptyResponse);
        }

        let mut choices = completion.choices;
        choices.sort_by_key(|c| c.index);
        Ok(choices.into_iter().map(|c| c.text).collect())
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tools: Option<&[Tool]>,
        sampling: &SamplingParams,
    ) -> Result<ChatResponse, ChatError> {
        ChatClient::chat(self, messages, model, tools, sampling).await
    }

    async fn complete(
        &self,
        prompts: &[String],
        model: &str,
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, ChatError> {
        ChatClient::complete(self, prompts, model, sampling).await
    }
}

/// Check the status, then decode the body
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ChatError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ChatError::Status { status, body: text });
    }
    if text.is_empty() {
        return Err(ChatError::EmptyResponse);
    }

    Ok(serde_json::from_str(&text)?)
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
