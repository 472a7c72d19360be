//! Demo entry point for the agentic orchestrator.
//!
//! Wires a real `LlmClient` (selected by config) against stand-in
//! `KnowledgeGraph`/`SnippetRuntime` collaborators, since a real API catalog
//! and snippet runtime are supplied by the embedding system, not this crate.
//! Useful for exercising the `extract -> plan -> exec -> finalize` pipeline
//! end to end without a server process.

use agentic_orchestrator::config::ConfigLoader;
use agentic_orchestrator::llm_client::LlmProvider;
use agentic_orchestrator::testing::{StubKnowledgeGraph, StubSnippetRuntime};
use agentic_orchestrator::{version_info, CancelSignal, ExecutionRequest, Orchestrator, RuntimeContext, ShutdownCoordinator};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "orchestrator-demo")]
#[command(about = "Run a prompt through the agentic orchestrator pipeline", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt end to end against the demo catalog.
    Run {
        /// Natural-language request.
        prompt: String,
        /// Request id used for tracing and telemetry tagging. Defaults to a
        /// freshly generated v4 UUID so concurrent demo runs never collide.
        #[arg(long)]
        request_id: Option<String>,
        /// Overrides config's orchestration.request_timeout_ms.
        #[arg(long)]
        request_timeout_ms: Option<u64>,
    },
    /// Print version information.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
    let _signal_handler = shutdown_coordinator.install_signal_handlers();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Version) {
        Commands::Version => {
            println!("{}", version_info());
            Ok(())
        }
        Commands::Run { prompt, request_id, request_timeout_ms } => {
            let config = ConfigLoader::new().load().await.map_err(|e| anyhow::anyhow!(e))?;
            let llm = LlmProvider::from_config(&config.llm).map_err(|e| anyhow::anyhow!(e))?;
            let graph = StubKnowledgeGraph::empty();
            let runtime = StubSnippetRuntime::always_succeeds("demo run");

            let timeout_ms = request_timeout_ms.unwrap_or(config.orchestration.request_timeout_ms);
            let context = RuntimeContext { llm: &llm, graph: &graph, runtime: &runtime, config };
            let orchestrator = Orchestrator::new(context);

            let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let request = ExecutionRequest::new(prompt, request_id);
            let cancel = CancelSignal::new(Duration::from_millis(timeout_ms));

            tokio::select! {
                result = orchestrator.handle(request, cancel.clone()) => {
                    match result {
                        Ok(result) => {
                            println!("{}", serde_json::to_string_pretty(&agentic_orchestrator::wire::ToolResponse::from(result))?);
                            Ok(())
                        }
                        Err(err) => {
                            eprintln!("orchestration failed: {}", err.message());
                            Err(anyhow::anyhow!(err.message()))
                        }
                    }
                }
                _ = shutdown_coordinator.wait_for_shutdown() => {
                    cancel.cancel();
                    eprintln!("shutdown requested, cancelling in-flight request");
                    Err(anyhow::anyhow!("cancelled by shutdown"))
                }
            }
        }
    }
}
