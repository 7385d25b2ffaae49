//! Engine error types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Graph store error: {0}")]
    Graph(#[from] corpusrag_db::DbError),

    #[error("Vector index unavailable: {0}")]
    VectorIndex(String),

    #[error("Vector index timed out after {0:?}")]
    VectorTimeout(Duration),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Chunk sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] corpusrag_core::CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
