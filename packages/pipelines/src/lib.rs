//! Job processors for the synthesis and derivation queues.
//!
//! - [`SynthesisPipeline`] builds a document from per-unit summaries of a
//!   subject and stores it as an artifact.
//! - [`DerivationPipeline`] enqueues a synthesis for the same subject, waits
//!   for it, and derives further content from its result.
//!
//! Both talk to the outside world only through the traits in
//! [`collaborators`].

pub mod collaborators;
mod config;
mod derivation;
mod error;
mod generator;
pub mod retry;
mod synthesis;

pub use collaborators::{
    ArtifactStore, CollaboratorError, Collaborators, ContextResolver, GenerationKind,
    GenerationRequest, Generator, SubjectContext, SummaryProvider, UnitSummary,
};
pub use config::PipelineConfig;
pub use derivation::{DERIVATION_QUEUE, DerivationPipeline};
pub use error::PipelineError;
pub use generator::MarkdownGenerator;
pub use retry::{RetryPolicy, backoff_delay};
pub use synthesis::{SYNTHESIS_QUEUE, SynthesisPipeline};
