//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables and indexes. Safe to run repeatedly.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(CATALOG_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps are stored as unix milliseconds so that range filters and
/// ordering stay numeric.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

-- Lookups by id, by subject and by partition
DEFINE INDEX IF NOT EXISTS job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_subject ON job FIELDS queue, subject_id, state;
DEFINE INDEX IF NOT EXISTS job_partition ON job FIELDS queue, state, seq;
DEFINE INDEX IF NOT EXISTS job_finished ON job FIELDS queue, state, finished_at_ms;
"#;

/// Subject catalog consumed by the pipelines' context and summary adapters.
const CATALOG_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS subject SCHEMALESS;
DEFINE INDEX IF NOT EXISTS subject_id ON subject FIELDS subject_id UNIQUE;

DEFINE TABLE IF NOT EXISTS unit SCHEMALESS;
DEFINE INDEX IF NOT EXISTS unit_id ON unit FIELDS unit_id UNIQUE;
DEFINE INDEX IF NOT EXISTS unit_subject ON unit FIELDS subject_id;

DEFINE TABLE IF NOT EXISTS unit_summary SCHEMALESS;
DEFINE INDEX IF NOT EXISTS unit_summary_id ON unit_summary FIELDS unit_id UNIQUE;
"#;
