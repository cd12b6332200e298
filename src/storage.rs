use async_trait::async_trait;
use qdrant_client::qdrant::{value::Kind, SearchPointsBuilder, Value};
use qdrant_client::Qdrant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::config::{IndexBackend, IndexConfig};
use crate::{Result, RagError};

/// Scalar metadata attached to a stored passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Read-only nearest-neighbour lookup over a pre-built collection.
///
/// Results come back most similar first and hold at most `k` passages.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>>;
}

pub async fn build_vector_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend {
        IndexBackend::Local => Ok(Arc::new(LocalIndex::new(&config.path))),
        IndexBackend::Qdrant => Ok(Arc::new(QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key.as_deref(),
            &config.collection_name,
        )?)),
    }
}

/// Cosine similarity of two equal-length vectors; zero vectors score 0.
///
/// Accumulates in f64 so large components do not overflow; non-finite results rank last.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = (dot / (norm_a * norm_b)) as f32;
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCollection {
    pub dimension: usize,
    pub entries: Vec<StoredEntry>,
}

/// Collection persisted as `collection.json` inside the index directory.
///
/// The file is reread on every query so results always reflect the stored state.
pub struct LocalIndex {
    root: PathBuf,
}

impl LocalIndex {
    pub const COLLECTION_FILE: &'static str = "collection.json";

    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn collection_path(&self) -> PathBuf {
        self.root.join(Self::COLLECTION_FILE)
    }

    async fn load_collection(&self) -> Result<Option<StoredCollection>> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RagError::Index(format!(
                    "Index location {} is not a directory",
                    self.root.display()
                )))
            }
            Err(e) => {
                return Err(RagError::Index(format!(
                    "Index directory {} is unreadable: {}",
                    self.root.display(),
                    e
                )))
            }
        }

        let path = self.collection_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No collection file at {}, treating index as empty", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(RagError::Index(format!("Failed to read {}: {}", path.display(), e)))
            }
        };

        let collection: StoredCollection = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::Index(format!("Corrupt collection {}: {}", path.display(), e)))?;

        if let Some(bad) = collection.entries.iter().find(|e| e.embedding.len() != collection.dimension) {
            return Err(RagError::Index(format!(
                "Entry {} has dimension {}, collection declares {}",
                bad.id,
                bad.embedding.len(),
                collection.dimension
            )));
        }

        Ok(Some(collection))
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>> {
        let collection = match self.load_collection().await? {
            Some(collection) if !collection.entries.is_empty() => collection,
            _ => return Ok(vec![]),
        };

        if vector.len() != collection.dimension {
            return Err(RagError::Index(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                collection.dimension
            )));
        }

        let mut scored: Vec<(f32, StoredEntry)> = collection
            .entries
            .into_iter()
            .map(|entry| (cosine_similarity(vector, &entry.embedding), entry))
            .collect();

        // Stable sort keeps file order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(_, entry)| Passage {
                text: entry.text,
                metadata: entry.metadata,
            })
            .collect())
    }
}

pub struct QdrantIndex {
    client: Qdrant,
    collection_name: String,
}

impl QdrantIndex {
    pub const TEXT_KEY: &'static str = "text";
    pub const METADATA_KEY: &'static str = "metadata";

    pub fn new(url: &str, api_key: Option<&str>, collection_name: &str) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            collection_name: collection_name.to_string(),
        })
    }

    fn scalar(value: &Value) -> Option<MetadataValue> {
        match value.kind.as_ref()? {
            Kind::StringValue(s) => Some(MetadataValue::Str(s.clone())),
            Kind::IntegerValue(i) => Some(MetadataValue::Int(*i)),
            Kind::DoubleValue(d) => Some(MetadataValue::Float(*d)),
            Kind::BoolValue(b) => Some(MetadataValue::Bool(*b)),
            _ => None,
        }
    }

    pub(crate) fn payload_to_passage(mut payload: HashMap<String, Value>) -> Result<Passage> {
        let text = match payload.remove(Self::TEXT_KEY).and_then(|v| v.kind) {
            Some(Kind::StringValue(text)) => text,
            _ => {
                return Err(RagError::Index(format!(
                    "Point payload has no string '{}' field",
                    Self::TEXT_KEY
                )))
            }
        };

        let mut metadata = BTreeMap::new();
        for (key, value) in payload {
            match value.kind {
                Some(Kind::StructValue(ref nested)) if key == Self::METADATA_KEY => {
                    for (inner_key, inner_value) in &nested.fields {
                        if let Some(scalar) = Self::scalar(inner_value) {
                            metadata.insert(inner_key.clone(), scalar);
                        }
                    }
                }
                _ => {
                    if let Some(scalar) = Self::scalar(&value) {
                        metadata.insert(key, scalar);
                    }
                }
            }
        }

        Ok(Passage { text, metadata })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection_name.clone(), vector.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await?;

        if response.result.len() > k {
            warn!("Qdrant returned {} points for limit {}", response.result.len(), k);
        }

        response
            .result
            .into_iter()
            .take(k)
            .map(|point| Self::payload_to_passage(point.payload))
            .collect()
    }
}
