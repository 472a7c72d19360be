//! `PlanExecutor` and the bounded step retry state machine.
//!
//! States: `design -> compile -> run -> done|fail`. A single attempt
//! counter is shared across design/compile/run failures within a step;
//! exceeding `maxAttempts` moves the step to `fail` without aborting the
//! whole plan — prior steps' results are still reported (`partial: true`).

use crate::domain::{Diagnostic, ExecutionPlan, MemoryEntry, Step, StepSummary};
use crate::error::OrchestratorError;
use crate::knowledge_graph::{GraphCache, OperationBundle};
use crate::llm_client::LlmClient;
use crate::memory::SharedMemory;
use crate::progress::ProgressSink;
use crate::snippet_runtime::{ClassArtifact, CompileOutcome, RunContext, RunOutcome, SnippetRuntime};
use crate::step_implementer::{PriorAttempt, StepImplementError, StepImplementer};
use std::collections::HashMap;

/// Outcome of running every step in a plan. `partial` means a later
/// step failing still surfaces earlier steps' summaries.
pub struct PlanExecutionOutcome {
    pub step_summaries: Vec<StepSummary>,
    pub operations_invoked: Vec<String>,
    pub partial: bool,
    pub failed_step_title: Option<String>,
}

/// Feedback carried from one failed attempt into the next design call.
enum Feedback {
    None,
    Diagnostics { snippet: String, diagnostics: Vec<Diagnostic> },
    RuntimeError { snippet: String, summary_of_error: String },
}

pub struct PlanExecutor<'a> {
    llm: &'a dyn LlmClient,
    runtime: &'a dyn SnippetRuntime,
    graph: &'a GraphCache<'a>,
    memory: &'a SharedMemory,
    progress: &'a dyn ProgressSink,
    default_namespace: &'a str,
    max_snippet_bytes: usize,
    service_endpoints: HashMap<String, String>,
}

impl<'a> PlanExecutor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: &'a dyn LlmClient,
        runtime: &'a dyn SnippetRuntime,
        graph: &'a GraphCache<'a>,
        memory: &'a SharedMemory,
        progress: &'a dyn ProgressSink,
        default_namespace: &'a str,
        max_snippet_bytes: usize,
        service_endpoints: HashMap<String, String>,
    ) -> Self {
        Self { llm, runtime, graph, memory, progress, default_namespace, max_snippet_bytes, service_endpoints }
    }

    /// Runs every step in `plan.steps` in submission order, strictly
    /// serial. Stops at the first step that exhausts its retry budget or
    /// observes cancellation; earlier steps' summaries are always returned.
    pub async fn execute(&self, plan: &ExecutionPlan, max_attempts: u8) -> Result<PlanExecutionOutcome, OrchestratorError> {
        let implementer = StepImplementer::new(self.llm, self.default_namespace, self.max_snippet_bytes);
        let total = plan.steps.len() as u64;
        self.progress.begin_stage("exec", "exec", total);

        let mut step_summaries = Vec::new();
        let mut operations_invoked = Vec::new();

        for (index, step) in plan.steps.iter().enumerate() {
            if self.progress.is_cancelled() {
                let (summary, err) = self.cancellation_error();
                self.progress.end_stage_error("exec", summary, HashMap::new());
                return Err(err);
            }

            match self.run_step(&implementer, step, max_attempts).await {
                StepOutcome::Done { summary, attempts, warnings } => {
                    operations_invoked.extend(step.operation_pairs().iter().map(|(s, o)| format!("{s}.{o}")));
                    step_summaries.push(StepSummary { title: step.title.clone(), summary });
                    let mut attrs = HashMap::new();
                    attrs.insert("service".to_string(), serde_json::json!(step.services.first().map(|s| s.service_name.clone())));
                    attrs.insert("attempts".to_string(), serde_json::json!(attempts));
                    if !warnings.is_empty() {
                        attrs.insert("warnings".to_string(), serde_json::json!(warnings));
                    }
                    self.progress.step("exec", (index + 1) as u64, &step.title, attrs);
                }
                StepOutcome::Exhausted => {
                    step_summaries.push(StepSummary { title: step.title.clone(), summary: "retry-exhausted".to_string() });
                    self.progress.end_stage_error("exec", &format!("step '{}' exhausted its retry budget", step.title), HashMap::new());
                    return Ok(PlanExecutionOutcome {
                        step_summaries,
                        operations_invoked,
                        partial: true,
                        failed_step_title: Some(step.title.clone()),
                    });
                }
                StepOutcome::Cancelled => {
                    let (summary, err) = self.cancellation_error();
                    self.progress.end_stage_error("exec", summary, HashMap::new());
                    return Err(err);
                }
            }
        }

        self.progress.end_stage_ok("exec", HashMap::new());
        Ok(PlanExecutionOutcome { step_summaries, operations_invoked, partial: false, failed_step_title: None })
    }

    async fn run_step(&self, implementer: &StepImplementer<'_>, step: &Step, max_attempts: u8) -> StepOutcome {
        let mut feedback = Feedback::None;
        let mut attempt: u8 = 0;
        let bundles = self.operation_bundles(step).await;

        loop {
            if self.progress.is_cancelled() {
                return StepOutcome::Cancelled;
            }
            attempt += 1;
            if attempt > max_attempts {
                return StepOutcome::Exhausted;
            }

            let prior = match &feedback {
                Feedback::None => None,
                Feedback::Diagnostics { snippet, diagnostics } => Some(PriorAttempt { snippet, diagnostics }),
                Feedback::RuntimeError { snippet, summary_of_error } => {
                    let diagnostic = Diagnostic { file: None, line: None, column: None, message: summary_of_error.clone() };
                    Some(PriorAttempt { snippet, diagnostics: std::slice::from_ref(&diagnostic) })
                }
            };

            let implementation = match implementer.implement(step, prior, &bundles).await {
                Ok(implementation) => implementation,
                Err(StepImplementError::Llm(_)) => {
                    feedback = Feedback::None;
                    continue;
                }
                Err(StepImplementError::Normalization { raw_snippet, diagnostics }) => {
                    feedback = Feedback::Diagnostics { snippet: raw_snippet, diagnostics };
                    continue;
                }
            };

            if self.progress.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            let compile_outcome = match self.runtime.compile(&implementation.snippet).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    feedback = Feedback::Diagnostics {
                        snippet: implementation.snippet,
                        diagnostics: vec![Diagnostic { file: None, line: None, column: None, message: "compile call failed".into() }],
                    };
                    continue;
                }
            };

            let artifact = match compile_outcome {
                CompileOutcome::Compiled { artifact, .. } => artifact,
                CompileOutcome::Failed { diagnostics } => {
                    feedback = Feedback::Diagnostics { snippet: implementation.snippet, diagnostics };
                    continue;
                }
            };

            if self.progress.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            match self.run_artifact(&artifact).await {
                Ok(RunOutcome::Succeeded { summary_text, memory_mutations }) => {
                    let warnings = self.apply_mutations(memory_mutations);
                    return StepOutcome::Done { summary: summary_text, attempts: attempt, warnings };
                }
                Ok(RunOutcome::Failed { summary_of_error }) => {
                    feedback = Feedback::RuntimeError { snippet: implementation.snippet, summary_of_error };
                }
                Err(_) => {
                    feedback = Feedback::RuntimeError { snippet: implementation.snippet, summary_of_error: "runtime call failed".into() };
                }
            }
        }
    }

    /// Fetches the prompt bundle for every operation this step references,
    /// via the per-request `GraphCache`. A missing bundle (graph has
    /// nothing for that key, or the lookup errors) is simply omitted rather
    /// than failing the step — the step's allowed-operations list already
    /// came from a validated plan, so a thin or absent bundle degrades the
    /// snippet-authoring prompt's context without blocking execution.
    async fn operation_bundles(&self, step: &Step) -> Vec<OperationBundle> {
        let mut bundles = Vec::new();
        for (service, operation) in step.operation_pairs() {
            let operation_key = format!("{service}.{operation}");
            if let Ok(Some(bundle)) = self.graph.bundle_for(&operation_key).await {
                bundles.push(bundle);
            }
        }
        bundles
    }

    async fn run_artifact(&self, artifact: &ClassArtifact) -> Result<RunOutcome, crate::snippet_runtime::RuntimeError> {
        let context = RunContext { shared_memory: self.memory, service_endpoints: self.service_endpoints.clone() };
        self.runtime.run(artifact, context).await
    }

    /// Distinguishes a request deadline elapsing from an explicit caller
    /// `cancel()`, so the stage error and the returned `OrchestratorError`
    /// report the right `kind`.
    fn cancellation_error(&self) -> (&'static str, OrchestratorError) {
        if self.progress.is_deadline_exceeded() {
            ("deadline exceeded", OrchestratorError::DeadlineExceeded)
        } else {
            ("cancelled", OrchestratorError::Cancelled)
        }
    }

    /// Writes each mutation to `SharedMemory`, returning one warning string
    /// per identifier dropped for failing the grammar check. Callers fold
    /// these into the step's own completion event attrs rather than
    /// emitting a separate event — a standalone event would need a
    /// `completed` value of its own, and there is none that doesn't either
    /// repeat or regress the step index already reported for this stage.
    fn apply_mutations(&self, mutations: Vec<MemoryEntry>) -> Vec<String> {
        let mut warnings = Vec::new();
        for entry in mutations {
            let identifier = entry.identifier.clone();
            if !self.memory.write(entry) {
                warnings.push(format!("dropped invalid identifier '{identifier}'"));
            }
        }
        warnings
    }
}

enum StepOutcome {
    Done { summary: String, attempts: u8, warnings: Vec<String> },
    Exhausted,
    Cancelled,
}
