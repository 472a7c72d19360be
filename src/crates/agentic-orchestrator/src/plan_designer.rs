//! `PlanDesigner`: prompt + catalog context -> `ExecutionPlan`,
//! validated against the catalog snapshot taken at plan time, with one
//! bounded re-plan on validation failure.

use crate::domain::{ExecutionOptions, ExecutionPlan};
use crate::knowledge_graph::{CatalogSnapshot, ContextMatch};
use crate::llm_client::LlmClient;
use crate::progress::ProgressSink;
use crate::prompt::plan_authoring_template;
use std::collections::HashMap;

#[derive(Debug)]
pub enum PlanDesignError {
    /// Two consecutive validation failures.
    Invalid { reasons: Vec<String> },
    Llm(String),
}

impl std::fmt::Display for PlanDesignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid { reasons } => write!(f, "invalid plan: {}", reasons.join("; ")),
            Self::Llm(detail) => write!(f, "llm error: {detail}"),
        }
    }
}

impl std::error::Error for PlanDesignError {}

pub struct PlanDesigner<'a> {
    llm: &'a dyn LlmClient,
    progress: &'a dyn ProgressSink,
}

impl<'a> PlanDesigner<'a> {
    pub fn new(llm: &'a dyn LlmClient, progress: &'a dyn ProgressSink) -> Self {
        Self { llm, progress }
    }

    /// Renders the plan-authoring prompt, calls the LLM under a JSON-schema
    /// constraint matching `ExecutionPlan`, and validates structurally and
    /// against `snapshot`. On failure, retries once with the failure reasons
    /// and the candidate operation set appended; two consecutive failures
    /// become `PlanDesignError::Invalid`. Each attempt reports its own
    /// `step` event on the caller's `plan` stage (`begin_stage("plan", _, 2)`
    /// declares up to two), so a re-plan is visible as two distinct events
    /// rather than folded into one "accepted" event at the end.
    pub async fn design(
        &self,
        prompt: &str,
        matches: &[ContextMatch],
        snapshot: &CatalogSnapshot,
        options: &ExecutionOptions,
    ) -> Result<ExecutionPlan, PlanDesignError> {
        let catalog_text = render_catalog(matches);

        let first = self.attempt(prompt, &catalog_text, None, options).await?;
        match validate_against_catalog(&first, snapshot) {
            Ok(()) => {
                self.progress.step("plan", 1, "plan accepted", HashMap::new());
                Ok(first)
            }
            Err(reasons) => {
                self.progress.step("plan", 1, "plan rejected, re-planning", reason_attrs(&reasons));
                let candidates = render_candidates(matches);
                let second = self.attempt(prompt, &catalog_text, Some((&reasons, &candidates)), options).await?;
                match validate_against_catalog(&second, snapshot) {
                    Ok(()) => {
                        self.progress.step("plan", 2, "plan accepted after re-plan", HashMap::new());
                        Ok(second)
                    }
                    Err(more_reasons) => {
                        self.progress.step("plan", 2, "plan rejected after re-plan", reason_attrs(&more_reasons));
                        Err(PlanDesignError::Invalid { reasons: more_reasons })
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        catalog_text: &str,
        retry_feedback: Option<(&[String], &str)>,
        _options: &ExecutionOptions,
    ) -> Result<ExecutionPlan, PlanDesignError> {
        let mut template = plan_authoring_template();
        let mut vars = HashMap::new();
        vars.insert("prompt", prompt.to_string());
        vars.insert("catalog", catalog_text.to_string());

        let disabled: Vec<&str> = if let Some((reasons, candidates)) = retry_feedback {
            for section in template.sections_mut() {
                if section.id == "retry_feedback" {
                    section.enabled_by_default = true;
                }
            }
            vars.insert("reasons", reasons.join("; "));
            vars.insert("candidates", candidates.to_string());
            Vec::new()
        } else {
            vec!["retry_feedback"]
        };

        let rendered = template.render(&vars, &disabled);
        let messages = vec![llm::Message::system(rendered.system), llm::Message::human(rendered.human)];
        let raw = self.llm.chat(messages).await.map_err(|e| PlanDesignError::Llm(e.to_string()))?;

        parse_plan(&raw)
    }
}

/// Parses the LLM's JSON reply into an `ExecutionPlan` and checks structural
/// validity (unique titles, no repeated ops). Catalog-membership
/// validation happens separately since it needs the snapshot.
fn parse_plan(raw: &str) -> Result<ExecutionPlan, PlanDesignError> {
    let json_text = crate::snippet::strip_code_fence(raw);
    let value = crate::schema::validate_plan_reply(json_text.trim())
        .map_err(|reasons| PlanDesignError::Invalid { reasons })?;
    let plan: ExecutionPlan =
        serde_json::from_value(value).map_err(|e| PlanDesignError::Invalid { reasons: vec![format!("plan JSON did not parse: {e}")] })?;
    plan.validate_structure().map_err(|reasons| PlanDesignError::Invalid { reasons })?;
    Ok(plan)
}

fn validate_against_catalog(plan: &ExecutionPlan, snapshot: &CatalogSnapshot) -> Result<(), Vec<String>> {
    let mut reasons = Vec::new();
    for step in &plan.steps {
        for (service, operation) in step.operation_pairs() {
            if !snapshot.contains(service, operation) {
                reasons.push(format!("unknown operation '{service}.{operation}' referenced by step '{}'", step.title));
            }
        }
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(reasons)
    }
}

fn reason_attrs(reasons: &[String]) -> HashMap<String, serde_json::Value> {
    let mut attrs = HashMap::new();
    attrs.insert("reasons".to_string(), serde_json::json!(reasons));
    attrs
}

fn render_catalog(matches: &[ContextMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("- {}: {}", m.entity_name, m.operation_keys.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_candidates(matches: &[ContextMatch]) -> String {
    matches
        .iter()
        .flat_map(|m| m.operation_keys.iter().map(move |op| format!("{}.{op}", m.entity_name)))
        .collect::<Vec<_>>()
        .join(", ")
}
