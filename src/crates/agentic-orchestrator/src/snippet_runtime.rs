//! `SnippetRuntime` collaborator contract. The core depends only on
//! this trait; the physical sandbox (in-process class loader or
//! out-of-process sidecar) is out of scope here and supplied by the
//! embedding binary. `StubSnippetRuntime` in `testing` backs the test suite.

use crate::domain::{Diagnostic, MemoryEntry};
use crate::memory::SharedMemory;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug)]
pub struct RuntimeError(pub String);

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RuntimeError {}

/// Opaque handle to a compiled snippet; the core never inspects it, only
/// passes it back into `run`.
#[derive(Debug, Clone)]
pub struct ClassArtifact(pub String);

#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Compiled { artifact: ClassArtifact, diagnostics: Vec<Diagnostic> },
    Failed { diagnostics: Vec<Diagnostic> },
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded { summary_text: String, memory_mutations: Vec<MemoryEntry> },
    Failed { summary_of_error: String },
}

/// Context a `Run` call is given: the accumulated shared memory plus
/// whatever operation clients/service endpoints the implementation needs to
/// actually place calls. The core only ever reads `shared_memory` through
/// this struct; it never owns operation clients itself.
pub struct RunContext<'a> {
    pub shared_memory: &'a SharedMemory,
    pub service_endpoints: std::collections::HashMap<String, String>,
}

#[async_trait]
pub trait SnippetRuntime: Send + Sync {
    /// Deterministic per `(snippet, context)`; no hidden state.
    async fn compile(&self, snippet: &str) -> Result<CompileOutcome, RuntimeError>;

    /// Wall-clock bounded; a timeout surfaces as `RunOutcome::Failed`, not
    /// as a `RuntimeError`. `memory_mutations` apply atomically on success;
    /// on failure nothing is observable.
    async fn run(&self, artifact: &ClassArtifact, context: RunContext<'_>) -> Result<RunOutcome, RuntimeError>;
}
