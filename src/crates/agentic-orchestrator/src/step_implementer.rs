//! `StepImplementer`: step + optional prior failed attempt ->
//! `StepImplementation`. Snippet normalization happens here so the
//! returned `qualifiedClassName` is always derivable.

use crate::domain::{Diagnostic, Step, StepImplementation};
use crate::knowledge_graph::OperationBundle;
use crate::llm_client::LlmClient;
use crate::prompt::step_authoring_template;
use crate::snippet::normalize;
use std::collections::HashMap;

#[derive(Debug)]
pub enum StepImplementError {
    Llm(String),
    /// Normalization rejected the snippet (no public class, oversized, ...).
    /// Carries the raw LLM output and synthetic diagnostics so the caller
    /// can feed them back into the next attempt exactly like a compile
    /// failure.
    Normalization { raw_snippet: String, diagnostics: Vec<Diagnostic> },
}

impl std::fmt::Display for StepImplementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm(detail) => write!(f, "llm error: {detail}"),
            Self::Normalization { diagnostics, .. } => {
                write!(f, "snippet normalization failed: {}", diagnostics.iter().map(|d| d.message.as_str()).collect::<Vec<_>>().join("; "))
            }
        }
    }
}

impl std::error::Error for StepImplementError {}

/// A prior failed attempt's snippet plus whatever diagnostics explain the
/// failure, embedded verbatim into the next prompt.
pub struct PriorAttempt<'a> {
    pub snippet: &'a str,
    pub diagnostics: &'a [Diagnostic],
}

pub struct StepImplementer<'a> {
    llm: &'a dyn LlmClient,
    default_namespace: &'a str,
    max_snippet_bytes: usize,
}

impl<'a> StepImplementer<'a> {
    pub fn new(llm: &'a dyn LlmClient, default_namespace: &'a str, max_snippet_bytes: usize) -> Self {
        Self { llm, default_namespace, max_snippet_bytes }
    }

    /// `bundles` is the snapshot of relevant operation prompt bundles the
    /// caller already fetched from the `KnowledgeGraph` for this step's
    /// operations (empty when the graph had nothing for any of them).
    pub async fn implement(
        &self,
        step: &Step,
        prior: Option<PriorAttempt<'_>>,
        bundles: &[OperationBundle],
    ) -> Result<StepImplementation, StepImplementError> {
        let rendered = self.render_prompt(step, &prior, bundles);
        let messages = vec![llm::Message::system(rendered.0), llm::Message::human(rendered.1)];
        let raw = self.llm.chat(messages).await.map_err(|e| StepImplementError::Llm(e.to_string()))?;

        let normalized = normalize(&raw, self.default_namespace, self.max_snippet_bytes)
            .map_err(|diagnostics| StepImplementError::Normalization { raw_snippet: raw.clone(), diagnostics })?;

        Ok(StepImplementation {
            qualified_class_name: normalized.qualified_class_name,
            snippet: normalized.source,
            explanation: format!("implements step '{}'", step.title),
        })
    }

    fn render_prompt(&self, step: &Step, prior: &Option<PriorAttempt<'_>>, bundles: &[OperationBundle]) -> (String, String) {
        let mut template = step_authoring_template();
        let mut vars = HashMap::new();
        vars.insert("title", step.title.clone());
        vars.insert("description", step.description.clone());
        vars.insert("operations", render_operations(step));

        let mut disabled: Vec<&str> = Vec::new();

        if let Some(attempt) = prior {
            for section in template.sections_mut() {
                if section.id == "prior_attempt" {
                    section.enabled_by_default = true;
                }
            }
            vars.insert("last_snippet", attempt.snippet.to_string());
            vars.insert("diagnostics", render_diagnostics(attempt.diagnostics));
        } else {
            disabled.push("prior_attempt");
        }

        if bundles.is_empty() {
            disabled.push("operation_details");
        } else {
            vars.insert("operation_details", render_bundles(bundles));
        }

        let rendered = template.render(&vars, &disabled);
        (rendered.system, rendered.human)
    }
}

fn render_bundles(bundles: &[OperationBundle]) -> String {
    bundles
        .iter()
        .map(|b| {
            format!(
                "{} {} {}\nrequest: {}\nresponse: {}{}",
                b.operation_id,
                b.method,
                b.path,
                b.request_schema,
                b.response_schema,
                if b.docs_markdown.is_empty() { String::new() } else { format!("\n{}", b.docs_markdown) }
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_operations(step: &Step) -> String {
    step.services
        .iter()
        .flat_map(|s| s.operations.iter().map(move |op| format!("{}.{op}", s.service_name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match (&d.file, d.line) {
            (Some(file), Some(line)) => format!("{file}:{line}: {}", d.message),
            _ => d.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceRef;
    use crate::testing::StubLlmClient;

    fn sample_step() -> Step {
        Step {
            title: "t1".into(),
            description: "echo the number".into(),
            services: vec![ServiceRef { service_name: "math".into(), operations: vec!["echo".into()] }],
        }
    }

    #[tokio::test]
    async fn implement_normalizes_first_attempt_snippet() {
        let llm = StubLlmClient::ok(vec!["public class T1 { void run() {} }"]);
        let implementer = StepImplementer::new(&llm, "core.req_x", 262_144);
        let result = implementer.implement(&sample_step(), None, &[]).await.unwrap();
        assert_eq!(result.qualified_class_name, "core.req_x.T1");
        assert!(result.snippet.starts_with("package core.req_x;"));
    }

    #[tokio::test]
    async fn implement_embeds_prior_snippet_and_diagnostics_in_prompt() {
        let llm = StubLlmClient::ok(vec!["package p; public class T1 {}"]);
        let implementer = StepImplementer::new(&llm, "core.req_x", 262_144);
        let prior_snippet = "package p; public class T1 { broken";
        let diags = vec![Diagnostic { file: None, line: Some(3), column: None, message: "missing-semicolon".into() }];
        implementer
            .implement(&sample_step(), Some(PriorAttempt { snippet: prior_snippet, diagnostics: &diags }), &[])
            .await
            .unwrap();

        let calls = llm.calls.lock().unwrap();
        let system_text = &calls[0][0].1;
        assert!(system_text.contains("broken"));
        assert!(system_text.contains("missing-semicolon"));
    }

    #[tokio::test]
    async fn implement_surfaces_normalization_failure_as_synthetic_diagnostic() {
        let llm = StubLlmClient::ok(vec!["package p; class NotPublic {}"]);
        let implementer = StepImplementer::new(&llm, "core.req_x", 262_144);
        let err = implementer.implement(&sample_step(), None, &[]).await.unwrap_err();
        match err {
            StepImplementError::Normalization { diagnostics, .. } => {
                assert!(diagnostics[0].message.contains("no public top-level class"));
            }
            StepImplementError::Llm(_) => panic!("expected normalization error"),
        }
    }

    #[tokio::test]
    async fn implement_embeds_operation_bundle_details_in_prompt() {
        let llm = StubLlmClient::ok(vec!["public class T1 {}"]);
        let implementer = StepImplementer::new(&llm, "core.req_x", 262_144);
        let bundle = OperationBundle {
            operation_id: "math.echo".into(),
            method: "GET".into(),
            path: "/echo".into(),
            request_schema: serde_json::json!({"type": "object"}),
            response_schema: serde_json::json!({"type": "string"}),
            examples: vec![],
            docs_markdown: "Echoes the input back.".into(),
        };
        implementer.implement(&sample_step(), None, std::slice::from_ref(&bundle)).await.unwrap();

        let calls = llm.calls.lock().unwrap();
        let system_text = &calls[0][0].1;
        assert!(system_text.contains("math.echo"));
        assert!(system_text.contains("/echo"));
        assert!(system_text.contains("Echoes the input back."));
    }

    #[tokio::test]
    async fn no_bundles_omits_operation_details_section() {
        let llm = StubLlmClient::ok(vec!["public class T1 {}"]);
        let implementer = StepImplementer::new(&llm, "core.req_x", 262_144);
        implementer.implement(&sample_step(), None, &[]).await.unwrap();

        let calls = llm.calls.lock().unwrap();
        let system_text = &calls[0][0].1;
        assert!(!system_text.contains("Operation signatures and docs"));
    }
}
