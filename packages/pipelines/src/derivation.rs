//! Secondary pipeline: derive content from a synthesis it waits for.

use actors::{JobContext, JobProcessor, ProcessFuture, QueueHandle};
use bytes::Bytes;
use queue_core::{EnqueueOptions, Job, JobResult, QueueError};
use serde_json::{Value, json};

use crate::collaborators::{Collaborators, GenerationKind, GenerationRequest};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

pub const DERIVATION_QUEUE: &str = "derivation";

/// Processor for the derivation queue.
///
/// Each job enqueues a synthesis for its subject on the synthesis queue and
/// blocks on it; a failed or late synthesis fails the derivation.
#[derive(Clone)]
pub struct DerivationPipeline {
    collaborators: Collaborators,
    synthesis: QueueHandle,
    config: PipelineConfig,
}

impl DerivationPipeline {
    pub fn new(
        collaborators: Collaborators,
        synthesis: QueueHandle,
        config: PipelineConfig,
    ) -> Self {
        Self {
            collaborators,
            synthesis,
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

        let options = EnqueueOptions::default()
            .with_field("requested_by", Value::String(job.id.to_string()));
        let dependency = match self.synthesis.enqueue(subject_id, options).await {
            Ok(dependency) => dependency,
            Err(e @ QueueError::Conflict { .. }) => return Err(PipelineError::Conflict(e)),
            Err(e) => return Err(e.into()),
        };
        ctx.report_progress(20);
        tracing::info!("Derivation {} waiting on {}", job.id, dependency.id);

        let source = self
            .synthesis
            .wait_for(&dependency.id, self.config.dependency_timeout)
            .await
            .map_err(|source| PipelineError::Dependency {
                job_id: dependency.id.clone(),
                source,
            })?;
        ctx.report_progress(60);

        let request = GenerationRequest::new(GenerationKind::Derivation, context.clone())
            .with_source(source.clone());
        let content = self
            .collaborators
            .generator
            .generate(request)
            .await
            .map_err(PipelineError::upstream("generation"))?;
        ctx.report_progress(90);

        let name = format!("{}.md", job.id);
        let url = self
            .collaborators
            .artifacts
            .write(Bytes::from(content), &name, subject_id)
            .await
            .map_err(PipelineError::upstream("artifact write"))?;

        Ok(JobResult::with_output(
            format!("derived content for {}", context.name),
            json!({
                "url": url,
                "dependency": dependency.id,
                "source_url": source.output_str("url"),
            }),
        ))
    }
}

impl JobProcessor for DerivationPipeline {
    fn process(&self, job: Job, ctx: JobContext) -> ProcessFuture {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.run(job, ctx).await.map_err(|e| e.to_string()) })
    }
}
