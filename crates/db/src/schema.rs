//! SurrealDB schema definitions

use crate::{DbConnection, DbError, Result};
use tracing::info;

/// Initialize the database schema
pub async fn initialize_schema(db: &DbConnection) -> Result<()> {
    info!("Initializing graph schema...");

    db.query(SCHEMA_DEFINITION)
        .await?
        .check()
        .map_err(|e| DbError::SchemaInit(e.to_string()))?;

    info!("Graph schema initialized");
    Ok(())
}

// Node and edge ids are derived upstream and stored as plain strings;
// record ids are the same strings so upserts are idempotent.
const SCHEMA_DEFINITION: &str = r#"
DEFINE TABLE IF NOT EXISTS kg_node SCHEMALESS;
DEFINE INDEX IF NOT EXISTS idx_kg_node_id ON kg_node FIELDS node_id UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_kg_node_type ON kg_node FIELDS node_type;

DEFINE TABLE IF NOT EXISTS kg_edge SCHEMALESS;
DEFINE INDEX IF NOT EXISTS idx_kg_edge_id ON kg_edge FIELDS edge_id UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_kg_edge_source ON kg_edge FIELDS source;
DEFINE INDEX IF NOT EXISTS idx_kg_edge_target ON kg_edge FIELDS target;
DEFINE INDEX IF NOT EXISTS idx_kg_edge_type ON kg_edge FIELDS edge_type;
"#;
