//! Question-to-answer orchestration: retrieve, assemble, render, generate.
//!
//! Every call runs its own sequence of stages and keeps all working state local, so a single
//! [`RagPipeline`] can serve concurrent questions. The first failing stage ends the call with
//! one [`RagError`](crate::RagError); nothing is retried and no partial answer escapes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::embedding::{build_embedding_service, EmbeddingService};
use crate::generation::{build_answer_generator, AnswerGenerator};
use crate::prompt::render_prompt;
use crate::retrieval::{validate_question, Retriever, DEFAULT_TOP_K};
use crate::storage::{build_vector_index, VectorIndex};
use crate::Result;

/// Handles the pipeline needs, constructed once at startup.
#[derive(Clone)]
pub struct PipelineConfig {
    pub embedding_service: Arc<dyn EmbeddingService>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub top_k: usize,
    pub assembler: ContextAssembler,
}

impl PipelineConfig {
    pub fn new(
        embedding_service: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            embedding_service,
            index,
            generator,
            top_k: DEFAULT_TOP_K,
            assembler: ContextAssembler::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub async fn from_rag_config(config: &RagConfig) -> Result<Self> {
        let embedding_service = build_embedding_service(&config.embedding).await?;
        let index = build_vector_index(&config.index).await?;
        let generator = build_answer_generator(&config.generation)?;

        let assembler = match config.retrieval.max_context_chars {
            Some(max) => ContextAssembler::with_max_chars(max),
            None => ContextAssembler::default(),
        };

        info!(
            embedding_model = %config.embedding.model,
            generation_model = %config.generation.model,
            index = %config.index.path,
            top_k = config.retrieval.top_k,
            "Pipeline configured"
        );

        Ok(Self::new(embedding_service, index, generator)
            .with_top_k(config.retrieval.top_k)
            .with_assembler(assembler))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Retrieving,
    Assembling,
    Generating,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub passages_retrieved: usize,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct RagPipeline {
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            retriever: Retriever::new(config.embedding_service, config.index),
            assembler: config.assembler,
            generator: config.generator,
            top_k: config.top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer a question from retrieved context.
    ///
    /// Zero retrieved passages is not an error: the model sees the empty-context sentinel.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let span = info_span!("answer", request_id = %Uuid::new_v4());
        async move {
            let start = Instant::now();
            let result = self.run(question).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(answer) => {
                    debug!(stage = ?PipelineStage::Succeeded);
                    info!(elapsed_ms, passages = answer.passages_retrieved, "Question answered");
                }
                Err(e) => {
                    debug!(stage = ?PipelineStage::Failed);
                    warn!(elapsed_ms, kind = ?e.kind(), "Question failed: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, question: &str) -> Result<Answer> {
        debug!(stage = ?PipelineStage::Idle);
        validate_question(question)?;

        debug!(stage = ?PipelineStage::Retrieving);
        let passages = self.retriever.retrieve(question, self.top_k).await?;

        debug!(stage = ?PipelineStage::Assembling);
        let context = self.assembler.assemble(&passages);
        let prompt = render_prompt(&context, question);

        debug!(stage = ?PipelineStage::Generating, model = self.generator.model());
        let text = self.generator.generate(&prompt).await?;

        Ok(Answer {
            text,
            passages_retrieved: passages.len(),
        })
    }

    /// The context block `answer` would send for this question, without generating.
    pub async fn preview_context(&self, question: &str) -> Result<String> {
        validate_question(question)?;
        let passages = self.retriever.retrieve(question, self.top_k).await?;
        Ok(self.assembler.assemble(&passages))
    }
}
