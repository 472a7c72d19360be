//! `Orchestrator`: the top-level pipeline. `handle` runs the four
//! stages in order — `extract`, `plan`, `exec`, `finalize` — each bracketed
//! by `ProgressSink.beginStage/endStageOk|Error`, except `exec`, which
//! `PlanExecutor` brackets itself since it owns the step loop end to end.

use crate::cancel::CancelSignal;
use crate::config::OrchestratorConfig;
use crate::domain::{ExecutionOptions, ExecutionRequest, ExecutionResult, ExecutionStatistics};
use crate::error::{OrchestratorError, Result};
use crate::knowledge_graph::{CatalogSnapshot, GraphCache, KnowledgeGraph};
use crate::llm_client::{LlmClient, TelemetryLlmClient};
use crate::memory::SharedMemory;
use crate::plan_designer::{PlanDesignError, PlanDesigner};
use crate::plan_executor::PlanExecutor;
use crate::progress::{noop_sink, ProgressSink, RateLimitedProgressSink};
use crate::snippet_runtime::SnippetRuntime;
use crate::summary::SummaryComposer;
use crate::telemetry::TelemetryRecorder;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Everything the orchestrator needs but does not own: collaborators and
/// config, injected at construction — an explicit context in place of a
/// singleton config or process-wide logger.
pub struct RuntimeContext<'a> {
    pub llm: &'a dyn LlmClient,
    pub graph: &'a dyn KnowledgeGraph,
    pub runtime: &'a dyn SnippetRuntime,
    pub config: OrchestratorConfig,
}

pub struct Orchestrator<'a> {
    context: RuntimeContext<'a>,
    telemetry: TelemetryRecorder,
}

impl<'a> Orchestrator<'a> {
    pub fn new(context: RuntimeContext<'a>) -> Self {
        Self { context, telemetry: TelemetryRecorder::default() }
    }

    /// `cancel` is owned by the caller, which retains it to invoke
    /// `cancel.cancel()` from another task. Its deadline defaults to
    /// `config.orchestration.request_timeout_ms` unless the caller built it
    /// with a tighter budget. Progress events computed during the call are
    /// discarded; use `handle_with_listener` to observe them (the
    /// transport layer that forwards them to a caller's `progressToken` is
    /// out of scope here).
    pub async fn handle(&self, request: ExecutionRequest, cancel: CancelSignal) -> Result<ExecutionResult> {
        self.handle_with_listener(request, cancel, |_event| {}).await
    }

    /// Same as `handle`, but every `ProgressEvent` the sink actually emits
    /// (after rate limiting) is passed to `on_event` as it happens.
    pub async fn handle_with_listener(
        &self,
        request: ExecutionRequest,
        cancel: CancelSignal,
        on_event: impl Fn(crate::domain::ProgressEvent) + Send + Sync + 'static,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        request.validate().map_err(OrchestratorError::InvalidRequest)?;

        let progress: Box<dyn ProgressSink> = if request.options.enable_progress && request.progress_token.is_some() {
            Box::new(RateLimitedProgressSink::new(
                true,
                cancel.clone(),
                Duration::from_millis(request.options.progress_min_interval_ms),
                request.options.progress_min_delta,
                on_event,
            ))
        } else {
            Box::new(noop_sink(cancel.clone()))
        };

        match self.run_stages(&request, cancel, progress.as_ref(), started).await {
            Ok(result) => Ok(result),
            Err(err) => Err(err),
        }
    }

    async fn run_stages(
        &self,
        request: &ExecutionRequest,
        cancel: CancelSignal,
        progress: &dyn ProgressSink,
        started: Instant,
    ) -> Result<ExecutionResult> {
        if let Some(err) = self.check_cancelled(&cancel, progress, "extract") {
            return Err(err);
        }

        let matches = self.extract(request, progress).await?;
        if matches.is_empty() {
            return Err(OrchestratorError::NoCatalogContext);
        }
        let snapshot = CatalogSnapshot::from_matches(&matches);

        if let Some(err) = self.check_cancelled(&cancel, progress, "plan") {
            return Err(err);
        }
        let plan = self.plan(request, &matches, &snapshot, progress).await?;

        if let Some(err) = self.check_cancelled(&cancel, progress, "exec") {
            return Err(err);
        }
        let memory = SharedMemory::new();
        let exec_llm = TelemetryLlmClient::new(self.context.llm, &self.telemetry, request.request_id.as_str(), "exec");
        let graph_cache = GraphCache::new(self.context.graph);
        let executor = PlanExecutor::new(
            &exec_llm,
            self.context.runtime,
            &graph_cache,
            &memory,
            progress,
            &self.context.config.snippet.default_namespace,
            self.context.config.snippet.max_bytes,
            HashMap::new(),
        );
        let exec_outcome = executor.execute(&plan, request.options.max_attempts).await?;

        if let Some(err) = self.check_cancelled(&cancel, progress, "finalize") {
            return Err(err);
        }
        let summary = self.finalize(request, &exec_outcome.step_summaries, &memory, progress).await;

        let statistics = ExecutionStatistics {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            wall_ms: started.elapsed().as_millis() as u64,
            operations_invoked: exec_outcome.operations_invoked,
        };

        Ok(ExecutionResult {
            answer: summary.answer,
            reasoning: summary.reasoning,
            per_step_summaries: exec_outcome.step_summaries,
            statistics,
            trace_id: request.request_id.clone(),
            partial: exec_outcome.partial,
        })
    }

    fn check_cancelled(&self, cancel: &CancelSignal, progress: &dyn ProgressSink, stage_id: &str) -> Option<OrchestratorError> {
        if cancel.is_deadline_exceeded() {
            progress.begin_stage(stage_id, stage_id, 0);
            progress.end_stage_error(stage_id, "deadline exceeded", HashMap::new());
            Some(OrchestratorError::DeadlineExceeded)
        } else if cancel.is_cancelled() {
            progress.begin_stage(stage_id, stage_id, 0);
            progress.end_stage_error(stage_id, "cancelled", HashMap::new());
            Some(OrchestratorError::Cancelled)
        } else {
            None
        }
    }

    async fn extract(&self, request: &ExecutionRequest, progress: &dyn ProgressSink) -> Result<Vec<crate::knowledge_graph::ContextMatch>> {
        progress.begin_stage("extract", "extract", 1);
        match self.context.graph.query_context(&request.prompt).await {
            Ok(matches) => {
                progress.step("extract", 1, "resolved catalog context", HashMap::new());
                progress.end_stage_ok("extract", HashMap::new());
                Ok(matches)
            }
            Err(err) => {
                let orchestrator_err: OrchestratorError = err.into();
                progress.end_stage_error("extract", &orchestrator_err.message(), HashMap::new());
                Err(orchestrator_err)
            }
        }
    }

    async fn plan(
        &self,
        request: &ExecutionRequest,
        matches: &[crate::knowledge_graph::ContextMatch],
        snapshot: &CatalogSnapshot,
        progress: &dyn ProgressSink,
    ) -> Result<crate::domain::ExecutionPlan> {
        progress.begin_stage("plan", "plan", 2);
        let plan_llm = TelemetryLlmClient::new(self.context.llm, &self.telemetry, request.request_id.as_str(), "plan");
        let designer = PlanDesigner::new(&plan_llm, progress);
        let options: &ExecutionOptions = &request.options;
        let result = designer.design(&request.prompt, matches, snapshot, options).await;
        match result {
            Ok(plan) => {
                progress.end_stage_ok("plan", HashMap::new());
                Ok(plan)
            }
            Err(PlanDesignError::Invalid { reasons }) => {
                let err = OrchestratorError::InvalidPlan { reasons };
                progress.end_stage_error("plan", &err.message(), HashMap::new());
                Err(err)
            }
            Err(PlanDesignError::Llm(detail)) => {
                let err = OrchestratorError::UpstreamUnavailable { collaborator: crate::error::Collaborator::Llm, detail };
                progress.end_stage_error("plan", &err.message(), HashMap::new());
                Err(err)
            }
        }
    }

    async fn finalize(
        &self,
        request: &ExecutionRequest,
        step_summaries: &[crate::domain::StepSummary],
        memory: &SharedMemory,
        progress: &dyn ProgressSink,
    ) -> crate::summary::Summary {
        progress.begin_stage("finalize", "finalize", 1);
        let finalize_llm = TelemetryLlmClient::new(self.context.llm, &self.telemetry, request.request_id.as_str(), "finalize");
        let composer = SummaryComposer::new(&finalize_llm);
        let summary = composer.compose(&request.prompt, step_summaries, memory).await;
        progress.step("finalize", 1, "composed summary", HashMap::new());
        progress.end_stage_ok("finalize", HashMap::new());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionRequest;
    use crate::knowledge_graph::ContextMatch;
    use crate::snippet_runtime::{ClassArtifact, CompileOutcome, RunOutcome};
    use crate::testing::{StubKnowledgeGraph, StubLlmClient, StubSnippetRuntime};

    fn sample_graph() -> StubKnowledgeGraph {
        StubKnowledgeGraph::new(
            vec![ContextMatch { entity_name: "math".into(), operation_keys: vec!["echo".into()], confidence: 10 }],
            vec![],
        )
    }

    #[tokio::test]
    async fn s1_happy_path_end_to_end() {
        let plan_json = r#"{"steps":[{"title":"t1","description":"echo the number","services":[{"service_name":"math","operations":["echo"]}]}]}"#;
        let llm = StubLlmClient::ok(vec![
            plan_json,
            "public class T1 {}",
            r#"{"answer":"42","reasoning":"single-step"}"#,
        ]);
        let graph = sample_graph();
        let runtime = StubSnippetRuntime::new(
            vec![CompileOutcome::Compiled { artifact: ClassArtifact("a".into()), diagnostics: vec![] }],
            vec![RunOutcome::Succeeded { summary_text: "42".into(), memory_mutations: vec![] }],
        );
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("echo 42", "req-1");
        let cancel = CancelSignal::new(Duration::from_secs(300));
        let result = orchestrator.handle(request, cancel).await.unwrap();

        assert_eq!(result.answer, "42");
        assert_eq!(result.reasoning, "single-step");
        assert!(!result.partial);
        assert_eq!(result.per_step_summaries.len(), 1);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_collaborator_call() {
        let llm = StubLlmClient::ok(vec![]);
        let graph = sample_graph();
        let runtime = StubSnippetRuntime::new(vec![], vec![]);
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("   ", "req-2");
        let cancel = CancelSignal::new(Duration::from_secs(300));
        let err = orchestrator.handle(request, cancel).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[tokio::test]
    async fn no_catalog_matches_surfaces_no_catalog_context() {
        let llm = StubLlmClient::ok(vec![]);
        let graph = StubKnowledgeGraph::empty();
        let runtime = StubSnippetRuntime::new(vec![], vec![]);
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("do something obscure", "req-3");
        let cancel = CancelSignal::new(Duration::from_secs(300));
        let err = orchestrator.handle(request, cancel).await.unwrap_err();
        assert_eq!(err.kind(), "NoCatalogContext");
    }

    #[tokio::test]
    async fn s4_cancelled_before_extract_returns_cancelled_error() {
        let llm = StubLlmClient::ok(vec![]);
        let graph = sample_graph();
        let runtime = StubSnippetRuntime::new(vec![], vec![]);
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("echo 42", "req-4");
        let cancel = CancelSignal::new(Duration::from_secs(300));
        cancel.cancel();
        let err = orchestrator.handle(request, cancel).await.unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
    }

    #[tokio::test]
    async fn elapsed_deadline_before_extract_returns_deadline_exceeded_not_cancelled() {
        let llm = StubLlmClient::ok(vec![]);
        let graph = sample_graph();
        let runtime = StubSnippetRuntime::new(vec![], vec![]);
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("echo 42", "req-4b");
        let cancel = CancelSignal::new(Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = orchestrator.handle(request, cancel).await.unwrap_err();
        assert_eq!(err.kind(), "DeadlineExceeded");
    }

    #[tokio::test]
    async fn s5_invalid_plan_then_successful_replan() {
        let invalid_plan = r#"{"steps":[{"title":"t1","description":"d","services":[{"service_name":"math","operations":["missing_op"]}]}]}"#;
        let valid_plan = r#"{"steps":[{"title":"t1","description":"d","services":[{"service_name":"math","operations":["echo"]}]}]}"#;
        let llm = StubLlmClient::ok(vec![
            invalid_plan,
            valid_plan,
            "public class T1 {}",
            r#"{"answer":"done","reasoning":"ok"}"#,
        ]);
        let graph = sample_graph();
        let runtime = StubSnippetRuntime::always_succeeds("done");
        let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config: OrchestratorConfig::default() };
        let orchestrator = Orchestrator::new(context);

        let request = ExecutionRequest::new("echo 42", "req-5").with_progress_token("tok-5");
        let cancel = CancelSignal::new(Duration::from_secs(300));
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let collected = events.clone();
        let result = orchestrator.handle_with_listener(request, cancel, move |e| collected.lock().unwrap().push(e)).await.unwrap();
        assert_eq!(result.answer, "done");

        let collected = events.lock().unwrap();
        let plan_steps: Vec<_> =
            collected.iter().filter(|e| e.stage_id == "plan" && e.status == crate::domain::StageStatus::Running).collect();
        assert_eq!(plan_steps.len(), 2, "the plan stage must report one step event per attempt, including the rejected first plan");
        assert_eq!(plan_steps[0].completed, 1);
        assert_eq!(plan_steps[1].completed, 2);
    }
}
