//! Offline generator composing Markdown from context and facts.

use futures_util::future::BoxFuture;

use crate::collaborators::{
    CollaboratorError, CollaboratorResult, GenerationKind, GenerationRequest, Generator,
};

/// Deterministic [`Generator`] that needs no external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownGenerator;

impl MarkdownGenerator {
    pub fn new() -> Self {
        Self
    }

    /// First sentence of every non-empty paragraph, one per line.
    fn summarize(texts: &[String]) -> String {
        texts
            .iter()
            .flat_map(|text| text.split("\n\n"))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.find(". ") {
                Some(end) => &p[..=end],
                None => p,
            })
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn synthesize(request: &GenerationRequest) -> String {
        let context = &request.context;
        let mut out = format!("# {}\n\n", context.name);
        if !context.description.is_empty() {
            out.push_str(context.description.trim());
            out.push_str("\n\n");
        }
        out.push_str("## Facts\n\n");
        if request.facts.is_empty() {
            out.push_str("_No facts available._\n");
        }
        for fact in &request.facts {
            out.push_str("- ");
            out.push_str(fact);
            out.push('\n');
        }
        out
    }

    fn derive(request: &GenerationRequest) -> CollaboratorResult<String> {
        let source = request
            .source
            .as_ref()
            .ok_or_else(|| CollaboratorError::Failed("derivation needs a source".to_string()))?;

        let mut out = format!("# {}: overview\n\n", request.context.name);
        out.push_str(&source.summary);
        out.push('\n');
        if let Some(url) = source.output_str("url") {
            out.push_str(&format!("\nFull document: <{url}>\n"));
        }
        Ok(out)
    }
}

impl Generator for MarkdownGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, CollaboratorResult<String>> {
        Box::pin(async move {
            match request.kind {
                GenerationKind::UnitSummary => Ok(Self::summarize(&request.facts)),
                GenerationKind::Synthesis => Ok(Self::synthesize(&request)),
                GenerationKind::Derivation => Self::derive(&request),
            }
        })
    }
}
