//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    #[error("Invalid stored record: {0}")]
    Decode(#[from] corpusrag_core::CoreError),

    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
