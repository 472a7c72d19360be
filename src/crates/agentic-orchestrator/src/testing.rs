//! Scriptable stub collaborators backing the end-to-end scenarios in the
//! testable-properties suite (S1-S6). Each stub is a FIFO queue of canned
//! responses; calling past the end of the queue panics, which turns "the
//! test under-scripted a call" into an immediate, loud test failure instead
//! of a silent default.

use crate::domain::{Diagnostic, MemoryEntry};
use crate::knowledge_graph::{ContextMatch, GraphError, KnowledgeGraph, OperationBundle};
use crate::llm_client::{LlmClient, LlmClientError};
use crate::snippet_runtime::{ClassArtifact, CompileOutcome, RunContext, RunOutcome, RuntimeError, SnippetRuntime};
use async_trait::async_trait;
use llm::Message;
use std::sync::Mutex;

/// FIFO queue of `Result<T, E>` with a descriptive panic when exhausted.
struct Script<T> {
    name: &'static str,
    responses: Mutex<std::collections::VecDeque<T>>,
}

impl<T> Script<T> {
    fn new(name: &'static str, responses: Vec<T>) -> Self {
        Self { name, responses: Mutex::new(responses.into()) }
    }

    fn next(&self) -> T {
        self.responses
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| panic!("{} script exhausted: test issued more calls than scripted", self.name))
    }

    fn calls_remaining(&self) -> usize {
        self.responses.lock().expect("script lock poisoned").len()
    }
}

/// Scriptable `LlmClient`. `chat` and `generate` share one response queue
/// since `generate` is implemented in terms of `chat` by every real
/// provider.
pub struct StubLlmClient {
    script: Script<Result<String, String>>,
    pub calls: Mutex<Vec<Vec<(String, String)>>>,
}

impl StubLlmClient {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            script: Script::new("StubLlmClient", responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(responses: Vec<&str>) -> Self {
        Self::new(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls_remaining(&self) -> usize {
        self.script.calls_remaining()
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmClientError> {
        let recorded = messages
            .iter()
            .map(|m| (format!("{:?}", m.role), m.text().unwrap_or_default().to_string()))
            .collect();
        self.calls.lock().expect("calls lock poisoned").push(recorded);
        self.script.next().map_err(LlmClientError)
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError> {
        self.chat(vec![Message::human(prompt)]).await
    }
}

/// Scriptable `KnowledgeGraph`. Context matches are returned verbatim on
/// every `query_context` call (the core snapshots once per request, so a
/// constant view is sufficient for tests); operation bundles
/// are looked up by key from a fixed table.
pub struct StubKnowledgeGraph {
    context_matches: Vec<ContextMatch>,
    operation_bundles: std::collections::HashMap<String, OperationBundle>,
    operation_lookups: std::sync::atomic::AtomicUsize,
}

impl StubKnowledgeGraph {
    pub fn new(context_matches: Vec<ContextMatch>, operation_bundles: Vec<(String, OperationBundle)>) -> Self {
        Self {
            context_matches,
            operation_bundles: operation_bundles.into_iter().collect(),
            operation_lookups: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![], vec![])
    }

    /// Number of `query_operation_for_prompt` calls actually reaching the
    /// graph, used to assert `GraphCache` avoids redundant lookups.
    pub fn operation_lookup_count(&self) -> usize {
        self.operation_lookups.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeGraph for StubKnowledgeGraph {
    async fn query_context(&self, _prompt: &str) -> Result<Vec<ContextMatch>, GraphError> {
        Ok(self.context_matches.clone())
    }

    async fn query_operation_for_prompt(&self, operation_key: &str) -> Result<Option<OperationBundle>, GraphError> {
        self.operation_lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.operation_bundles.get(operation_key).cloned())
    }
}

/// Scriptable `SnippetRuntime`. Compile and run outcomes are independent
/// queues so a test can script "fails to compile twice, then compiles and
/// runs" (S2/S3) precisely.
pub struct StubSnippetRuntime {
    compile_script: Script<CompileOutcome>,
    run_script: Script<RunOutcome>,
}

impl StubSnippetRuntime {
    pub fn new(compile_outcomes: Vec<CompileOutcome>, run_outcomes: Vec<RunOutcome>) -> Self {
        Self {
            compile_script: Script::new("StubSnippetRuntime.compile", compile_outcomes),
            run_script: Script::new("StubSnippetRuntime.run", run_outcomes),
        }
    }

    /// A runtime that compiles and runs successfully every time, returning
    /// `summary_text` and no memory mutations. Convenient for plan-level
    /// tests that don't care about retry behavior.
    pub fn always_succeeds(summary_text: impl Into<String>) -> Self {
        let summary = summary_text.into();
        Self::new(
            vec![CompileOutcome::Compiled { artifact: ClassArtifact("stub.Artifact".into()), diagnostics: vec![] }; 1],
            vec![RunOutcome::Succeeded { summary_text: summary, memory_mutations: vec![] }; 1],
        )
    }
}

#[async_trait]
impl SnippetRuntime for StubSnippetRuntime {
    async fn compile(&self, _snippet: &str) -> Result<CompileOutcome, RuntimeError> {
        Ok(self.compile_script.next())
    }

    async fn run(&self, _artifact: &ClassArtifact, _context: RunContext<'_>) -> Result<RunOutcome, RuntimeError> {
        Ok(self.run_script.next())
    }
}

/// Convenience constructor for a compile-failure diagnostic, as scripted in
/// S2/S3.
pub fn diagnostic(message: impl Into<String>) -> Diagnostic {
    Diagnostic { file: None, line: None, column: None, message: message.into() }
}

pub fn memory_entry(identifier: &str, value: serde_json::Value) -> MemoryEntry {
    MemoryEntry {
        identifier: identifier.to_string(),
        description: format!("{identifier} written by a test snippet"),
        model: serde_json::json!({"type": "any"}),
        value,
    }
}
