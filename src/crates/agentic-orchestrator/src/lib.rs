//! # Agentic Orchestrator
//!
//! Turns a natural-language prompt into a plan of steps against a
//! user-supplied API catalog, implements each step as a generated snippet,
//! executes it with bounded retry, and composes a final answer — without
//! a server process, a database, or a session store. Everything lives for
//! the duration of one `Orchestrator::handle` call.
//!
//! ## Pipeline
//!
//! `extract` (catalog context) -> `plan` (LLM-authored step list, validated
//! against the catalog) -> `exec` (per-step design/compile/run with bounded
//! retry, over shared memory) -> `finalize` (LLM-composed answer, with a
//! deterministic fallback).
//!
//! Collaborators — the LLM, the API catalog, and the snippet runtime — are
//! injected as trait objects (`llm_client::LlmClient`,
//! `knowledge_graph::KnowledgeGraph`, `snippet_runtime::SnippetRuntime`), so
//! the core has no network or process dependency of its own; `testing`
//! supplies scriptable stand-ins for tests and the demo binary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentic_orchestrator::{CancelSignal, ExecutionRequest, Orchestrator, RuntimeContext};
//! use agentic_orchestrator::config::OrchestratorConfig;
//! use agentic_orchestrator::testing::{StubKnowledgeGraph, StubLlmClient, StubSnippetRuntime};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let llm = StubLlmClient::ok(vec!["..."]);
//! let graph = StubKnowledgeGraph::empty();
//! let runtime = StubSnippetRuntime::always_succeeds("done");
//! let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
//! let orchestrator = Orchestrator::new(context);
//!
//! let request = ExecutionRequest::new("add 2 and 2", "req-1");
//! let cancel = CancelSignal::new(Duration::from_secs(300));
//! let result = orchestrator.handle(request, cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod knowledge_graph;
pub mod llm_client;
pub mod memory;
pub mod orchestrator;
pub mod plan_designer;
pub mod plan_executor;
pub mod progress;
pub mod prompt;
pub mod schema;
pub mod shutdown;
pub mod snippet;
pub mod snippet_runtime;
pub mod step_implementer;
pub mod summary;
pub mod telemetry;
pub mod testing;
pub mod version;
pub mod wire;

// Re-export the public API surface most callers need.
pub use cancel::CancelSignal;
pub use domain::{
    ExecutionOptions, ExecutionPlan, ExecutionRequest, ExecutionResult, ExecutionStatistics, MemoryEntry, ProgressEvent,
    ServiceRef, StageStatus, Step, StepImplementation, StepSummary,
};
pub use error::{Collaborator, OrchestratorError, Result};
pub use orchestrator::{Orchestrator, RuntimeContext};
pub use shutdown::ShutdownCoordinator;
pub use version::{full_version as version_info, short_version, VersionInfo};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.contains(version::VERSION));
    }
}
