//! SurrealDB persistence for the job processing system.
//!
//! This crate provides the database connection and repositories for
//! queue jobs and the subject catalog the pipelines read from.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;

/// Connect with the given configuration and make sure the schema exists.
///
/// Every call opens an independent connection; `mem://` endpoints get a
/// fresh, isolated datastore.
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
