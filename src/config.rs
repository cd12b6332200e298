use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::Result;

pub const ENV_PREFIX: &str = "MEDQNA";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Query embeddings kept in memory; 0 disables the cache.
    pub cache_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    OpenAI,
    Candle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Ollama,
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Directory holding the persisted collection for the local backend.
    pub path: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_context_chars: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Ollama,
                model: "llama3.1:8b".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: None,
                timeout_secs: None,
                cache_size: 0,
            },
            generation: GenerationConfig {
                provider: GenerationProvider::Ollama,
                model: "llama3.1:8b".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: None,
                timeout_secs: None,
                temperature: None,
            },
            index: IndexConfig {
                backend: IndexBackend::Local,
                path: "./medqna/vectordb".to_string(),
                qdrant_url: "http://localhost:6334".to_string(),
                qdrant_api_key: None,
                collection_name: "medqna".to_string(),
            },
            retrieval: RetrievalConfig {
                top_k: 20,
                max_context_chars: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl RagConfig {
    /// Defaults, then the optional TOML file, then `MEDQNA__SECTION__KEY` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    pub fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    pub fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&RagConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: RagConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(crate::RagError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.embedding.model.trim().is_empty() || self.generation.model.trim().is_empty() {
            return Err(crate::RagError::Config("model identifiers must not be empty".to_string()));
        }
        if self.index.backend == IndexBackend::Local && self.index.path.trim().is_empty() {
            return Err(crate::RagError::Config("index.path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
