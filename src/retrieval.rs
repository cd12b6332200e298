use std::sync::Arc;
use tracing::debug;
use crate::embedding::EmbeddingService;
use crate::storage::{Passage, VectorIndex};
use crate::{Result, RagError};

pub const DEFAULT_TOP_K: usize = 20;

/// Reject questions that are blank once surrounding whitespace is removed.
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidQuestion("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

/// Embeds a question and asks the index for its nearest passages.
///
/// Ranking belongs to the index; passages are returned in the order it produced them.
pub struct Retriever {
    embedding_service: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedding_service: Arc<dyn EmbeddingService>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedding_service,
            index,
        }
    }

    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Passage>> {
        validate_question(question)?;
        if k == 0 {
            return Err(RagError::InvalidQuestion("k must be at least 1".to_string()));
        }

        let embedding = self.embedding_service.embed_text(question).await?;
        debug!(
            model = self.embedding_service.model(),
            dimension = embedding.len(),
            "Embedded question"
        );

        let mut passages = self.index.similarity_search(&embedding, k).await?;
        passages.truncate(k);

        debug!("Retrieved {} passages (k = {})", passages.len(), k);
        Ok(passages)
    }
}
