use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use crate::config::{GenerationConfig, GenerationProvider};
use crate::embedding::http_client;
use crate::{Result, RagError};

/// Single-shot language-model completion. No streaming, no conversation state.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
    fn model(&self) -> &str;
}

pub fn build_answer_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider {
        GenerationProvider::Ollama => Ok(Arc::new(OllamaGenerator::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.temperature,
            config.timeout_secs,
        )?)),
        GenerationProvider::OpenAI => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RagError::Config("generation.api_key is required for the openai provider".to_string())
            })?;
            Ok(Arc::new(OpenAIGenerator::new(
                config.endpoint.clone(),
                api_key,
                config.model.clone(),
                config.temperature,
                config.timeout_secs,
            )?))
        }
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Generation(format!("{} request timed out: {}", provider, err))
    } else {
        RagError::Generation(format!("{} API call failed: {}", provider, err))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaGenerator {
    pub fn new(
        endpoint: String,
        model: String,
        temperature: Option<f32>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let client = http_client(timeout_secs)
            .map_err(|e| RagError::Generation(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            temperature,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.endpoint);
        debug!("Calling Ollama chat API: {}", url);

        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options: self.temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Generation(format!("Ollama API error ({}): {}", status, error_text)));
        }

        let body: OllamaChatResponse = response.json().await
            .map_err(|e| RagError::Generation(format!("Failed to parse Ollama response: {}", e)))?;

        if body.message.content.trim().is_empty() {
            return Err(RagError::Generation("Ollama returned an empty completion".to_string()));
        }
        Ok(body.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: ChatMessage,
}

pub struct OpenAIGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIGenerator {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        temperature: Option<f32>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let client = http_client(timeout_secs)
            .map_err(|e| RagError::Generation(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OpenAIChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
        };

        let response = self.client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Generation(format!("OpenAI API error: {}", error_text)));
        }

        let body: OpenAIChatResponse = response.json().await
            .map_err(|e| RagError::Generation(format!("Failed to parse OpenAI response: {}", e)))?;

        body.choices.into_iter().next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| RagError::Generation("No completion returned from OpenAI".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
