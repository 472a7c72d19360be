//! Wire shapes: the JSON the tool entry point and progress stream actually
//! carry. Kept separate from `domain` so the internal data model can evolve
//! without churning the public wire contract, and so the transport layer
//! (out of scope here) has one place to serialize from.

use crate::domain::{ExecutionOptions, ExecutionRequest, ExecutionResult, ProgressEvent, StageStatus};
use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};

/// Inbound request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub prompt: String,
    #[serde(default)]
    pub options: Option<ToolRequestOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestOptions {
    pub max_attempts: Option<u8>,
    pub enable_progress: Option<bool>,
    pub progress_min_interval_ms: Option<u64>,
    pub progress_min_delta: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl ToolRequest {
    /// Builds an `ExecutionRequest` from the wire body; `request_timeout_ms`
    /// is pulled out separately since it governs the `CancelSignal`
    /// deadline, not `ExecutionOptions`.
    pub fn into_domain(self, request_id: impl Into<String>) -> (ExecutionRequest, Option<u64>) {
        let wire_options = self.options.unwrap_or_default();
        let mut options = ExecutionOptions::default();
        if let Some(max_attempts) = wire_options.max_attempts {
            options.max_attempts = max_attempts;
        }
        if let Some(enable_progress) = wire_options.enable_progress {
            options.enable_progress = enable_progress;
        }
        if let Some(min_interval) = wire_options.progress_min_interval_ms {
            options.progress_min_interval_ms = min_interval;
        }
        if let Some(min_delta) = wire_options.progress_min_delta {
            options.progress_min_delta = min_delta;
        }

        let request = ExecutionRequest::new(self.prompt, request_id).with_options(options);
        (request, wire_options.request_timeout_ms)
    }
}

/// Successful response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub answer: String,
    pub reasoning: String,
    pub steps: Vec<ToolStepSummary>,
    pub stats: ToolStats,
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStepSummary {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub wall_ms: u64,
    pub operations: Vec<String>,
}

impl From<ExecutionResult> for ToolResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            answer: result.answer,
            reasoning: result.reasoning,
            steps: result
                .per_step_summaries
                .into_iter()
                .map(|s| ToolStepSummary { title: s.title, summary: s.summary })
                .collect(),
            stats: ToolStats {
                prompt_tokens: result.statistics.prompt_tokens,
                completion_tokens: result.statistics.completion_tokens,
                total_tokens: result.statistics.total_tokens,
                wall_ms: result.statistics.wall_ms,
                operations: result.statistics.operations_invoked,
            },
            trace_id: result.trace_id,
        }
    }
}

/// Failure response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorResponse {
    pub error: ToolError,
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl ToolErrorResponse {
    pub fn from_error(err: &OrchestratorError, trace_id: impl Into<String>) -> Self {
        Self {
            error: ToolError { kind: err.kind().to_string(), message: err.message() },
            trace_id: trace_id.into(),
        }
    }
}

/// Progress event wire shape. `percent` is serialized even though
/// `domain::ProgressEvent` derives it, since the wire contract is the one
/// place callers actually read it from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProgressEvent {
    pub stage_id: String,
    pub label: String,
    pub completed: u64,
    pub total: u64,
    pub percent: u8,
    pub message: String,
    pub attrs: serde_json::Value,
    pub status: WireStageStatus,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStageStatus {
    Begin,
    Running,
    Ok,
    Error,
    Cancelled,
}

impl From<StageStatus> for WireStageStatus {
    fn from(status: StageStatus) -> Self {
        match status {
            StageStatus::Begin => Self::Begin,
            StageStatus::Running => Self::Running,
            StageStatus::Ok => Self::Ok,
            StageStatus::Error => Self::Error,
            StageStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<ProgressEvent> for WireProgressEvent {
    fn from(event: ProgressEvent) -> Self {
        let percent = event.percent();
        Self {
            stage_id: event.stage_id,
            label: event.label,
            completed: event.completed,
            total: event.total,
            percent,
            message: event.message,
            attrs: serde_json::to_value(&event.attrs).unwrap_or(serde_json::Value::Null),
            status: event.status.into(),
            protocol_version: event.protocol_version,
        }
    }
}
