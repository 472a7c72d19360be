//! Error types for the orchestrator core.
//!
//! Hand-rolled enum with manual `Display`/`Error` impls, matching the rest
//! of this codebase's error-handling idiom (no `thiserror` derive here;
//! `anyhow` stays out past a component boundary and is reserved for the
//! demo binary's `main`).

use std::fmt;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// A named collaborator the core depends on but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Llm,
    KnowledgeGraph,
    SnippetRuntime,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::KnowledgeGraph => write!(f, "knowledge_graph"),
            Self::SnippetRuntime => write!(f, "snippet_runtime"),
        }
    }
}

/// Taxonomy of failures the orchestrator can report to a caller.
///
/// Every variant maps to a stable `kind` string in the wire response
/// (see `OrchestratorError::kind`).
#[derive(Debug)]
pub enum OrchestratorError {
    /// Empty prompt or malformed `options`.
    InvalidRequest(String),

    /// The extract stage found zero candidate operations.
    NoCatalogContext,

    /// PlanDesigner produced a plan referencing unknown operations after one retry.
    InvalidPlan { reasons: Vec<String> },

    /// A step exceeded `maxAttempts`.
    StepExhausted { step_title: String },

    /// SnippetRuntime returned an unrecoverable error not tied to the snippet itself.
    RuntimeFailure { step_title: String, detail: String },

    /// The request deadline was exceeded before a stage could complete.
    DeadlineExceeded,

    /// The request was cancelled via `cancelSignal`.
    Cancelled,

    /// A collaborator (LLM, graph, runtime) was not reachable.
    UpstreamUnavailable { collaborator: Collaborator, detail: String },

    /// An invariant was violated. Always logged and surfaced.
    Internal(String),
}

impl OrchestratorError {
    /// Stable machine-readable kind, used as the `error.kind` field on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NoCatalogContext => "NoCatalogContext",
            Self::InvalidPlan { .. } => "InvalidPlan",
            Self::StepExhausted { .. } => "StepExhausted",
            Self::RuntimeFailure { .. } => "RuntimeFailure",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Cancelled => "Cancelled",
            Self::UpstreamUnavailable { .. } => "UpstreamUnavailable",
            Self::Internal(_) => "Internal",
        }
    }

    /// Short human message suitable for the wire response; long diagnostics
    /// stay in the trace (tracing spans), not in this string.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::NoCatalogContext => write!(f, "no catalog context found for prompt"),
            Self::InvalidPlan { reasons } => {
                write!(f, "invalid plan: {}", reasons.join("; "))
            }
            Self::StepExhausted { step_title } => {
                write!(f, "step '{step_title}' exhausted its retry budget")
            }
            Self::RuntimeFailure { step_title, detail } => {
                write!(f, "runtime failure in step '{step_title}': {detail}")
            }
            Self::DeadlineExceeded => write!(f, "request deadline exceeded"),
            Self::Cancelled => write!(f, "request cancelled"),
            Self::UpstreamUnavailable { collaborator, detail } => {
                write!(f, "{collaborator} unavailable: {detail}")
            }
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<crate::llm_client::LlmClientError> for OrchestratorError {
    fn from(err: crate::llm_client::LlmClientError) -> Self {
        Self::UpstreamUnavailable {
            collaborator: Collaborator::Llm,
            detail: err.to_string(),
        }
    }
}

impl From<crate::knowledge_graph::GraphError> for OrchestratorError {
    fn from(err: crate::knowledge_graph::GraphError) -> Self {
        Self::UpstreamUnavailable {
            collaborator: Collaborator::KnowledgeGraph,
            detail: err.to_string(),
        }
    }
}

impl From<crate::snippet_runtime::RuntimeError> for OrchestratorError {
    fn from(err: crate::snippet_runtime::RuntimeError) -> Self {
        Self::UpstreamUnavailable {
            collaborator: Collaborator::SnippetRuntime,
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(OrchestratorError::NoCatalogContext.kind(), "NoCatalogContext");
        assert_eq!(OrchestratorError::Cancelled.kind(), "Cancelled");
        assert_eq!(
            OrchestratorError::StepExhausted { step_title: "t1".into() }.kind(),
            "StepExhausted"
        );
    }

    #[test]
    fn display_includes_step_title() {
        let err = OrchestratorError::StepExhausted { step_title: "fetch-user".into() };
        assert!(err.to_string().contains("fetch-user"));
    }

    #[test]
    fn upstream_unavailable_names_collaborator() {
        let err = OrchestratorError::UpstreamUnavailable {
            collaborator: Collaborator::SnippetRuntime,
            detail: "connection refused".into(),
        };
        assert!(err.to_string().contains("snippet_runtime"));
        assert!(err.to_string().contains("connection refused"));
    }
}
