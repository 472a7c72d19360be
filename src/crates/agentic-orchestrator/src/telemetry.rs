//! LLM call telemetry hooks for the `LlmClient` collaborator.
//!
//! Same tagged-enum + tracing-backed logger shape this codebase already
//! uses for execution events, narrowed to the handful of facts worth
//! recording about a `LlmClient` call: which stage issued it, how long it
//! took, and its token usage when the provider reports one.

use serde::{Deserialize, Serialize};

/// One observed `LlmClient::chat`/`generate` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmCallEvent {
    /// A call was issued; recorded before the collaborator returns.
    Started { request_id: String, stage: String, timestamp: i64 },
    /// A call returned text successfully.
    Completed {
        request_id: String,
        stage: String,
        duration_ms: u64,
        prompt_tokens: Option<u64>,
        completion_tokens: Option<u64>,
        timestamp: i64,
    },
    /// A call failed; folded into `OrchestratorError::UpstreamUnavailable`
    /// by the caller, but still worth a telemetry record of its own.
    Failed { request_id: String, stage: String, duration_ms: u64, detail: String, timestamp: i64 },
}

impl LlmCallEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Started { timestamp, .. } | Self::Completed { timestamp, .. } | Self::Failed { timestamp, .. } => *timestamp,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Started { request_id, stage, .. } => format!("llm call started: {request_id}/{stage}"),
            Self::Completed { request_id, stage, duration_ms, .. } => {
                format!("llm call completed: {request_id}/{stage} ({duration_ms}ms)")
            }
            Self::Failed { request_id, stage, detail, .. } => format!("llm call failed: {request_id}/{stage} - {detail}"),
        }
    }

    pub fn started(request_id: impl Into<String>, stage: impl Into<String>, now: i64) -> Self {
        Self::Started { request_id: request_id.into(), stage: stage.into(), timestamp: now }
    }

    pub fn completed(
        request_id: impl Into<String>,
        stage: impl Into<String>,
        duration_ms: u64,
        prompt_tokens: Option<u64>,
        completion_tokens: Option<u64>,
        now: i64,
    ) -> Self {
        Self::Completed {
            request_id: request_id.into(),
            stage: stage.into(),
            duration_ms,
            prompt_tokens,
            completion_tokens,
            timestamp: now,
        }
    }

    pub fn failed(request_id: impl Into<String>, stage: impl Into<String>, duration_ms: u64, detail: impl Into<String>, now: i64) -> Self {
        Self::Failed { request_id: request_id.into(), stage: stage.into(), duration_ms, detail: detail.into(), timestamp: now }
    }
}

/// Records telemetry events via `tracing`, same as the rest of this
/// codebase's in-process logging — no separate exporter here, since
/// telemetry exporters are out of scope.
#[derive(Debug, Clone)]
pub struct TelemetryRecorder {
    enabled: bool,
}

impl TelemetryRecorder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn record(&self, event: &LlmCallEvent) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            event = ?event,
            timestamp = event.timestamp(),
            description = %event.description(),
            "llm call telemetry"
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_event_carries_request_and_stage() {
        let event = LlmCallEvent::started("req-1", "plan", 1_000);
        match &event {
            LlmCallEvent::Started { request_id, stage, .. } => {
                assert_eq!(request_id, "req-1");
                assert_eq!(stage, "plan");
            }
            _ => panic!("expected Started"),
        }
        assert!(event.description().contains("req-1/plan"));
    }

    #[test]
    fn completed_event_reports_duration_and_tokens() {
        let event = LlmCallEvent::completed("req-1", "exec", 120, Some(50), Some(30), 1_000);
        match &event {
            LlmCallEvent::Completed { duration_ms, prompt_tokens, completion_tokens, .. } => {
                assert_eq!(*duration_ms, 120);
                assert_eq!(*prompt_tokens, Some(50));
                assert_eq!(*completion_tokens, Some(30));
            }
            _ => panic!("expected Completed"),
        }
        assert!(event.description().contains("120ms"));
    }

    #[test]
    fn failed_event_description_includes_detail() {
        let event = LlmCallEvent::failed("req-1", "finalize", 5, "connection refused", 1_000);
        assert!(event.description().contains("connection refused"));
    }

    #[test]
    fn disabled_recorder_does_not_panic() {
        let recorder = TelemetryRecorder::new(false);
        assert!(!recorder.is_enabled());
        recorder.record(&LlmCallEvent::started("req-1", "plan", 0));
    }

    #[test]
    fn events_are_serializable() {
        let event = LlmCallEvent::started("req-1", "plan", 1_000);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("started"));
        let round_tripped: LlmCallEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, event);
    }
}
