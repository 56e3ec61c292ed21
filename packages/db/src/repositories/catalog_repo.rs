//! Subject catalog: subjects, their units and cached unit summaries.

use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// A subject-of-work as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A unit of source material belonging to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub unit_id: String,
    pub subject_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// Cached summary of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummaryRecord {
    pub unit_id: String,
    pub facts: Vec<String>,
    pub updated_at_ms: i64,
}

/// Repository for catalog reads and writes.
#[derive(Clone)]
pub struct CatalogRepository {
    db: Database,
}

impl CatalogRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace a subject.
    pub async fn put_subject(&self, subject: &SubjectRecord) -> Result<(), DbError> {
        let _: Option<SubjectRecord> = self
            .db
            .upsert(("subject", subject.subject_id.clone()))
            .content(subject.clone())
            .await?;
        Ok(())
    }

    pub async fn get_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>, DbError> {
        Ok(self.db.select(("subject", subject_id.to_string())).await?)
    }

    /// Create or replace a unit.
    pub async fn put_unit(&self, unit: &UnitRecord) -> Result<(), DbError> {
        let _: Option<UnitRecord> = self
            .db
            .upsert(("unit", unit.unit_id.clone()))
            .content(unit.clone())
            .await?;
        Ok(())
    }

    pub async fn get_unit(&self, unit_id: &str) -> Result<Option<UnitRecord>, DbError> {
        Ok(self.db.select(("unit", unit_id.to_string())).await?)
    }

    /// Units of a subject, ordered by id.
    pub async fn units_for(&self, subject_id: &str) -> Result<Vec<UnitRecord>, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM unit WHERE subject_id = $subject ORDER BY unit_id ASC")
            .bind(("subject", subject_id.to_string()))
            .await?;

        Ok(response.take(0)?)
    }

    pub async fn get_summary(&self, unit_id: &str) -> Result<Option<UnitSummaryRecord>, DbError> {
        Ok(self.db.select(("unit_summary", unit_id.to_string())).await?)
    }

    /// Create or replace a unit's summary.
    pub async fn put_summary(&self, summary: &UnitSummaryRecord) -> Result<(), DbError> {
        let _: Option<UnitSummaryRecord> = self
            .db
            .upsert(("unit_summary", summary.unit_id.clone()))
            .content(summary.clone())
            .await?;
        Ok(())
    }
}
