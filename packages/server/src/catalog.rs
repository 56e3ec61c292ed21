//! Pipeline collaborators backed by the SurrealDB catalog tables.

use std::sync::Arc;

use chrono::Utc;
use db::DbError;
use db::repositories::{CatalogRepository, UnitSummaryRecord};
use futures_util::future::BoxFuture;
use pipelines::collaborators::CollaboratorResult;
use pipelines::{
    CollaboratorError, ContextResolver, GenerationKind, GenerationRequest, Generator,
    SubjectContext, SummaryProvider, UnitSummary,
};

fn failed(e: DbError) -> CollaboratorError {
    CollaboratorError::Failed(e.to_string())
}

/// Resolves subjects and their units from the `subject` and `unit` tables.
#[derive(Clone)]
pub struct CatalogResolver {
    repo: CatalogRepository,
}

impl CatalogResolver {
    pub fn new(repo: CatalogRepository) -> Self {
        Self { repo }
    }
}

impl ContextResolver for CatalogResolver {
    fn resolve<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<SubjectContext>> {
        Box::pin(async move {
            let subject = self
                .repo
                .get_subject(subject_id)
                .await
                .map_err(failed)?
                .ok_or_else(|| CollaboratorError::NotFound(format!("subject {subject_id}")))?;
            let units = self.repo.units_for(subject_id).await.map_err(failed)?;

            Ok(SubjectContext {
                subject_id: subject.subject_id,
                name: subject.name,
                description: subject.description,
                unit_ids: units.into_iter().map(|u| u.unit_id).collect(),
            })
        })
    }
}

/// Unit summaries cached in `unit_summary`, computed on first use.
#[derive(Clone)]
pub struct CatalogSummaries {
    repo: CatalogRepository,
    generator: Arc<dyn Generator>,
}

impl CatalogSummaries {
    pub fn new(repo: CatalogRepository, generator: Arc<dyn Generator>) -> Self {
        Self { repo, generator }
    }
}

impl SummaryProvider for CatalogSummaries {
    fn ensure_summary<'a>(&'a self, unit_id: &'a str) -> BoxFuture<'a, CollaboratorResult<()>> {
        Box::pin(async move {
            if self.repo.get_summary(unit_id).await.map_err(failed)?.is_some() {
                return Ok(());
            }

            let unit = self
                .repo
                .get_unit(unit_id)
                .await
                .map_err(failed)?
                .ok_or_else(|| CollaboratorError::NotFound(format!("unit {unit_id}")))?;

            let context = SubjectContext {
                subject_id: unit.subject_id.clone(),
                name: unit.title.clone(),
                ..SubjectContext::default()
            };
            let request = GenerationRequest::new(GenerationKind::UnitSummary, context)
                .with_facts(vec![unit.body]);
            let text = self.generator.generate(request).await?;

            let facts: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            tracing::debug!("Summarized unit {} into {} facts", unit_id, facts.len());

            self.repo
                .put_summary(&UnitSummaryRecord {
                    unit_id: unit_id.to_string(),
                    facts,
                    updated_at_ms: Utc::now().timestamp_millis(),
                })
                .await
                .map_err(failed)
        })
    }

    fn summary<'a>(
        &'a self,
        unit_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UnitSummary>>> {
        Box::pin(async move {
            let record = self.repo.get_summary(unit_id).await.map_err(failed)?;
            Ok(record.map(|r| UnitSummary {
                unit_id: r.unit_id,
                facts: r.facts,
            }))
        })
    }
}
