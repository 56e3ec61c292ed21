//! Primary pipeline: synthesize a document from per-unit summaries.

use actors::{JobContext, JobProcessor, ProcessFuture};
use bytes::Bytes;
use queue_core::{Job, JobResult};
use serde_json::json;

use crate::collaborators::{Collaborators, GenerationKind, GenerationRequest};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

pub const SYNTHESIS_QUEUE: &str = "synthesis";

/// Processor for the synthesis queue.
#[derive(Clone)]
pub struct SynthesisPipeline {
    collaborators: Collaborators,
    config: PipelineConfig,
}

/// Outcome of the unit step.
#[derive(Debug, Default)]
struct UnitReport {
    succeeded: Vec<String>,
    failed: Vec<String>,
}

impl SynthesisPipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn run(&self, job: Job, ctx: JobContext) -> Result<JobResult, PipelineError> {
        let subject_id = job.subject_id.as_str();

        let context = self
            .collaborators
            .resolver
            .resolve(subject_id)
            .await
            .map_err(PipelineError::upstream("context resolution"))?;
        ctx.report_progress(10);

        let units = self.prepare_units(&context.unit_ids, &ctx).await;
        if !context.unit_ids.is_empty() && units.succeeded.is_empty() {
            return Err(PipelineError::Upstream {
                step: "unit summaries",
                message: format!(
                    "none of the {} units of {} could be summarized",
                    context.unit_ids.len(),
                    subject_id
                ),
            });
        }

        let facts = self.aggregate(&units.succeeded).await?;
        ctx.report_progress(75);

        let request = GenerationRequest::new(GenerationKind::Synthesis, context.clone())
            .with_facts(facts.clone());
        ctx.report_progress(80);
        let document = self
            .collaborators
            .generator
            .generate(request)
            .await
            .map_err(PipelineError::upstream("generation"))?;

        let name = format!("{}.md", job.id);
        let url = self
            .collaborators
            .artifacts
            .write(Bytes::from(document), &name, subject_id)
            .await
            .map_err(PipelineError::upstream("artifact write"))?;
        ctx.report_progress(90);

        tracing::info!(
            "Synthesized {} from {}/{} units: {}",
            subject_id,
            units.succeeded.len(),
            context.unit_ids.len(),
            url
        );

        Ok(JobResult::with_output(
            format!("synthesized document for {}", context.name),
            json!({
                "url": url,
                "units_total": context.unit_ids.len(),
                "units_succeeded": units.succeeded.len(),
                "units_failed": units.failed,
                "facts": facts.len(),
            }),
        ))
    }

    /// Ensure every unit summary, tolerating individual failures.
    ///
    /// Progress moves from 20 to 70 as units are handled.
    async fn prepare_units(&self, unit_ids: &[String], ctx: &JobContext) -> UnitReport {
        ctx.report_progress(20);

        let mut report = UnitReport::default();
        let total = unit_ids.len();

        for (index, unit_id) in unit_ids.iter().enumerate() {
            if index > 0 && !self.config.inter_unit_delay.is_zero() {
                tokio::time::sleep(self.config.inter_unit_delay).await;
            }

            let label = format!("summary of unit {unit_id}");
            let result = self
                .config
                .unit_retry
                .run(&label, |_| self.collaborators.summaries.ensure_summary(unit_id))
                .await;

            match result {
                Ok(()) => report.succeeded.push(unit_id.clone()),
                Err(e) => {
                    tracing::warn!("Skipping unit {}: {}", unit_id, e);
                    report.failed.push(unit_id.clone());
                }
            }

            ctx.report_progress(20 + (50 * (index + 1) / total) as u8);
        }

        report
    }

    /// Collect the facts of the summarized units, dropping repeats.
    async fn aggregate(&self, unit_ids: &[String]) -> Result<Vec<String>, PipelineError> {
        let mut facts: Vec<String> = Vec::new();
        for unit_id in unit_ids {
            let summary = self
                .collaborators
                .summaries
                .summary(unit_id)
                .await
                .map_err(PipelineError::upstream("fact aggregation"))?;
            for fact in summary.into_iter().flat_map(|s| s.facts) {
                if !facts.contains(&fact) {
                    facts.push(fact);
                }
            }
        }
        Ok(facts)
    }
}

impl JobProcessor for SynthesisPipeline {
    fn process(&self, job: Job, ctx: JobContext) -> ProcessFuture {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.run(job, ctx).await.map_err(|e| e.to_string()) })
    }
}
