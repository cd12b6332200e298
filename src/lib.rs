pub mod api;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod storage;


pub use error::{ErrorKind, RagError, Result};
pub use pipeline::{Answer, PipelineConfig, RagPipeline};
