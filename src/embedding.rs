use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::Tokenizer;
use hf_hub::api::tokio::Api;
use lru::LruCache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::{Result, RagError};

/// Maps text into the similarity space of the index.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
    fn model(&self) -> &str;
}

/// Shared reqwest client; without a timeout a hung endpoint hangs the caller.
pub(crate) fn http_client(timeout_secs: Option<u64>) -> reqwest::Result<Client> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

pub async fn build_embedding_service(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
    let service: Arc<dyn EmbeddingService> = match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedding::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.timeout_secs,
        )?),
        EmbeddingProvider::OpenAI => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RagError::Config("embedding.api_key is required for the openai provider".to_string())
            })?;
            Arc::new(OpenAIEmbedding::with_endpoint(
                config.endpoint.clone(),
                api_key,
                config.model.clone(),
                config.timeout_secs,
            )?)
        }
        EmbeddingProvider::Candle => Arc::new(CandleEmbedding::new(&config.model).await?),
    };

    match NonZeroUsize::new(config.cache_size) {
        Some(capacity) => Ok(Arc::new(CachedEmbedding::new(service, capacity))),
        None => Ok(service),
    }
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct OllamaEmbedding {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedding {
    pub fn new(endpoint: String, model: String, timeout_secs: Option<u64>) -> Result<Self> {
        let client = http_client(timeout_secs)
            .map_err(|e| RagError::Embedding(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let response = self.client
            .post(&url)
            .json(&OllamaEmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Ollama API call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!("Ollama API error ({}): {}", status, error_text)));
        }

        let body: OllamaEmbeddingResponse = response.json().await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(RagError::Embedding("Ollama returned an empty embedding".to_string()));
        }
        Ok(body.embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAIEmbedding {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAIEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_endpoint(
            "https://api.openai.com/v1".to_string(),
            api_key,
            "text-embedding-3-small".to_string(),
            None,
        )
    }

    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        model: String,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let client = http_client(timeout_secs)
            .map_err(|e| RagError::Embedding(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingService for OpenAIEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let response = self.client
            .post(format!("{}/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&OpenAIEmbeddingRequest { input: vec![text], model: &self.model })
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("OpenAI API call failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!("OpenAI API error: {}", error_text)));
        }

        let body: OpenAIEmbeddingResponse = response.json().await
            .map_err(|e| RagError::Embedding(format!("Failed to parse OpenAI response: {}", e)))?;

        body.data.into_iter().next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| RagError::Embedding("No embedding returned from OpenAI".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Sentence embeddings computed locally from a BERT checkpoint on the HuggingFace hub.
pub struct CandleEmbedding {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
}

impl CandleEmbedding {
    pub async fn new(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        info!("Loading local embedding model {}", model_id);

        let api = Api::new()?;
        let repo = api.model(model_id.to_string());

        let tokenizer_path = repo.get("tokenizer.json").await?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        let config_path = repo.get("config.json").await?;
        let config_content = tokio::fs::read_to_string(config_path).await
            .map_err(|e| RagError::Embedding(format!("Failed to read model config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| RagError::Embedding(format!("Invalid model config: {}", e)))?;

        let weights_path = repo.get("model.safetensors").await?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
        })
    }

    fn compute_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self.tokenizer.encode(text, true)
            .map_err(|e| RagError::Embedding(format!("Tokenization failed: {}", e)))?;

        let tokens = encoding.get_ids();
        let token_ids = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let token_type_ids = token_ids.zeros_like()?;
        let attention_mask = Tensor::ones((1, tokens.len()), DType::U32, &self.device)?;

        let hidden = self.model.forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling over tokens
        let pooled = hidden.mean(1)?;
        let embedding = pooled.to_vec2::<f32>()?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Model produced no output".to_string()))?;

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Ok(embedding);
        }
        Ok(embedding.iter().map(|x| x / norm).collect())
    }
}

#[async_trait]
impl EmbeddingService for CandleEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.compute_embedding(text)
    }

    fn model(&self) -> &str {
        &self.model_id
    }
}

/// LRU cache in front of another provider. Only affects latency, never results.
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingService>,
    cache: Mutex<LruCache<u64, Vec<f32>>>,
}

impl CachedEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingService>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache_key(&self, text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        self.inner.model().hash(&mut hasher);
        hasher.finish()
    }

    fn lookup(&self, key: u64) -> Option<Vec<f32>> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(&key).cloned(),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl EmbeddingService for CachedEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);
        if let Some(cached) = self.lookup(key) {
            return Ok(cached);
        }

        let embedding = self.inner.embed_text(text).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, embedding.clone());
        }
        Ok(embedding)
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
