//! Graph storage for the corpus RAG pipeline
//!
//! The [`GraphStore`] trait is the narrow repository interface the graph
//! builder publishes into and the retriever traverses. Two backends:
//! [`MemoryGraphStore`] for small corpora and tests, and the SurrealDB
//! [`Repository`].

pub mod error;
pub mod memory;
pub mod repository;
pub mod schema;
pub mod store;

pub use error::{DbError, Result};
pub use memory::MemoryGraphStore;
pub use repository::Repository;
pub use store::{Direction, GraphStats, GraphStore};

use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;

/// Database connection type
pub type DbConnection = Surreal<Db>;

const NAMESPACE: &str = "corpusrag";
const DATABASE: &str = "graph";

/// Initialize database with RocksDB (persistent)
#[cfg(feature = "rocksdb")]
pub async fn init_persistent(path: impl AsRef<std::path::Path>) -> Result<DbConnection> {
    use surrealdb::engine::local::RocksDb;

    let db = Surreal::new::<RocksDb>(path.as_ref()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Initialize database in-memory
pub async fn init_memory() -> Result<DbConnection> {
    let db = Surreal::new::<Mem>(()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Setup database namespace, database, and schema
async fn setup_database(db: &DbConnection) -> Result<()> {
    db.use_ns(NAMESPACE).use_db(DATABASE).await?;
    schema::initialize_schema(db).await?;
    Ok(())
}
