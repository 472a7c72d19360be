//! Core data model: requests, plans, steps, shared-memory entries, progress
//! events and the final result shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recognized, optional keys on `ExecutionRequest`. Unknown keys coming in
/// over the wire are ignored but preserved in telemetry attributes by the
/// caller-facing layer, not by this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptions {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
    #[serde(default = "default_progress_min_interval_ms")]
    pub progress_min_interval_ms: u64,
    #[serde(default = "default_progress_min_delta")]
    pub progress_min_delta: u64,
    #[serde(default = "default_enable_progress")]
    pub enable_progress: bool,
    pub llm_temperature: Option<f32>,
    pub llm_max_tokens: Option<usize>,
}

fn default_max_attempts() -> u8 {
    3
}
fn default_progress_min_interval_ms() -> u64 {
    300
}
fn default_progress_min_delta() -> u64 {
    1
}
fn default_enable_progress() -> bool {
    true
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            progress_min_interval_ms: default_progress_min_interval_ms(),
            progress_min_delta: default_progress_min_delta(),
            enable_progress: default_enable_progress(),
            llm_temperature: None,
            llm_max_tokens: None,
        }
    }
}

impl ExecutionOptions {
    /// Clamp `max_attempts` into the documented `1..=10` range.
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.clamp(1, 10);
        self.progress_min_interval_ms = self.progress_min_interval_ms.min(10_000);
        self
    }
}

/// A single inbound request to the orchestrator.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub request_id: String,
    pub progress_token: Option<String>,
    pub options: ExecutionOptions,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            request_id: request_id.into(),
            progress_token: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options.normalized();
        self
    }

    pub fn with_progress_token(mut self, token: impl Into<String>) -> Self {
        self.progress_token = Some(token.into());
        self
    }

    /// `InvalidRequest` check: the prompt must be non-empty once trimmed.
    pub fn validate(&self) -> Result<(), String> {
        tooling::validation::Validator::new(self.prompt.trim().to_string(), "prompt")
            .not_empty()
            .validate()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// One service+operations reference inside a `Step`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRef {
    pub service_name: String,
    pub operations: Vec<String>,
}

/// One unit of plan execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub title: String,
    pub description: String,
    pub services: Vec<ServiceRef>,
}

impl Step {
    /// All `(serviceName, operation)` pairs referenced by this step, in order.
    pub fn operation_pairs(&self) -> Vec<(&str, &str)> {
        self.services
            .iter()
            .flat_map(|s| s.operations.iter().map(move |op| (s.service_name.as_str(), op.as_str())))
            .collect()
    }
}

/// A validated, immutable sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub steps: Vec<Step>,
}

impl ExecutionPlan {
    /// Structural validity only (`len >= 1`, unique titles, no repeated
    /// operations within a step). Catalog-membership validation happens in
    /// `PlanDesigner` against a `KnowledgeGraph` snapshot.
    pub fn validate_structure(&self) -> Result<(), Vec<String>> {
        let mut reasons = Vec::new();
        if self.steps.is_empty() {
            reasons.push("plan must contain at least one step".to_string());
        }
        let mut seen_titles = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen_titles.insert(&step.title) {
                reasons.push(format!("duplicate step title '{}'", step.title));
            }
            for service in &step.services {
                let mut seen_ops = std::collections::HashSet::new();
                for op in &service.operations {
                    if !seen_ops.insert(op) {
                        reasons.push(format!(
                            "step '{}' repeats operation '{}' for service '{}'",
                            step.title, op, service.service_name
                        ));
                    }
                }
            }
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }
}

/// Structured diagnostic returned by a `SnippetRuntime` compile or run failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

/// Generated code for one step attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepImplementation {
    pub qualified_class_name: String,
    pub snippet: String,
    pub explanation: String,
}

/// One entry in the per-request shared value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub identifier: String,
    pub description: String,
    pub model: serde_json::Value,
    pub value: serde_json::Value,
}

/// Valid `MemoryEntry.identifier`: must start with an ASCII letter, followed
/// by any number of ASCII letters, digits, or `_`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Lifecycle state of a single progress event's stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Begin,
    Running,
    Ok,
    Error,
    Cancelled,
}

/// Wire shape for a single progress event (`protocolVersion` 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage_id: String,
    pub label: String,
    pub completed: u64,
    pub total: u64,
    pub message: String,
    pub attrs: HashMap<String, serde_json::Value>,
    pub status: StageStatus,
    pub protocol_version: u32,
}

impl ProgressEvent {
    /// `percent` is derived, never stored: `completed / total * 100`, clamped.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = (self.completed as f64 / self.total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Token accounting and operation count for a completed request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub wall_ms: u64,
    pub operations_invoked: Vec<String>,
}

/// Per-step textual summary in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub title: String,
    pub summary: String,
}

/// The final, successful result of an `ExecutionRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub answer: String,
    pub reasoning: String,
    pub per_step_summaries: Vec<StepSummary>,
    pub statistics: ExecutionStatistics,
    pub trace_id: String,
    /// Set when a later step failed but earlier steps already produced results.
    pub partial: bool,
}
