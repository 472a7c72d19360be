//! `LlmClient` collaborator contract and a concrete implementation
//! built on the `llm` crate's provider clients, constructed from config the
//! same way this codebase's `LlmProvider::from_config` dispatches on a
//! provider name string.

use crate::config::LlmConfig;
use crate::telemetry::{LlmCallEvent, TelemetryRecorder};
use async_trait::async_trait;
use llm::config::{LocalLlmConfig, RemoteLlmConfig};
use llm::{ChatModel, ChatRequest, Message};
use std::fmt;
use std::time::Instant;

/// Error surfaced by an `LlmClient` call. Folded into
/// `OrchestratorError::UpstreamUnavailable` at the core's boundary.
#[derive(Debug)]
pub struct LlmClientError(pub String);

impl fmt::Display for LlmClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LlmClientError {}

impl From<llm::LlmError> for LlmClientError {
    fn from(err: llm::LlmError) -> Self {
        Self(err.to_string())
    }
}

/// Collaborator contract the core depends on. Both `generate` and
/// `chat` return raw text; when the caller supplied a JSON schema the
/// returned text must be parseable under it, with best-effort fallback on
/// parse failure left to the caller (PlanDesigner/SummaryComposer), not to
/// this trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmClientError>;
    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError>;
}

/// Wraps a concrete `llm` crate provider, selected by `config.llm.provider`.
pub enum LlmProvider {
    Ollama(llm::local::OllamaClient),
    LlamaCpp(llm::local::LlamaCppClient),
    LmStudio(llm::local::LmStudioClient),
    OpenAi(llm::remote::OpenAiClient),
    Claude(llm::remote::ClaudeClient),
    Deepseek(llm::remote::DeepseekClient),
    Grok(llm::remote::GrokClient),
    OpenRouter(llm::remote::OpenRouterClient),
    Gemini(llm::remote::GeminiClient),
}

impl fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ollama(_) => "Ollama",
            Self::LlamaCpp(_) => "LlamaCpp",
            Self::LmStudio(_) => "LmStudio",
            Self::OpenAi(_) => "OpenAi",
            Self::Claude(_) => "Claude",
            Self::Deepseek(_) => "Deepseek",
            Self::Grok(_) => "Grok",
            Self::OpenRouter(_) => "OpenRouter",
            Self::Gemini(_) => "Gemini",
        };
        write!(f, "LlmProvider::{name}")
    }
}

impl LlmProvider {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmClientError> {
        let provider = config.provider.to_lowercase();
        let require_api_key = || {
            config
                .api_key
                .clone()
                .ok_or_else(|| LlmClientError(format!("{provider} requires an api_key")))
        };

        match provider.as_str() {
            "ollama" => {
                let base = config.api_base.clone().unwrap_or_else(|| "http://localhost:11434".to_string());
                Ok(Self::Ollama(llm::local::OllamaClient::new(LocalLlmConfig::new(base, config.model.clone()))))
            }
            "llama_cpp" | "llamacpp" => {
                let base = config.api_base.clone().unwrap_or_else(|| "http://localhost:8080".to_string());
                Ok(Self::LlamaCpp(llm::local::LlamaCppClient::new(LocalLlmConfig::new(base, config.model.clone()))))
            }
            "lmstudio" | "lm_studio" => {
                let base = config.api_base.clone().unwrap_or_else(|| "http://localhost:1234".to_string());
                Ok(Self::LmStudio(llm::local::LmStudioClient::new(LocalLlmConfig::new(base, config.model.clone()))))
            }
            "openai" => {
                let base = config.api_base.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                Ok(Self::OpenAi(llm::remote::OpenAiClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            "anthropic" | "claude" => {
                let base = config.api_base.clone().unwrap_or_else(|| "https://api.anthropic.com".to_string());
                Ok(Self::Claude(llm::remote::ClaudeClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            "deepseek" => {
                let base = config.api_base.clone().unwrap_or_else(|| "https://api.deepseek.com".to_string());
                Ok(Self::Deepseek(llm::remote::DeepseekClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            "grok" | "xai" => {
                let base = config.api_base.clone().unwrap_or_else(|| "https://api.x.ai".to_string());
                Ok(Self::Grok(llm::remote::GrokClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            "openrouter" => {
                let base = config.api_base.clone().unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string());
                Ok(Self::OpenRouter(llm::remote::OpenRouterClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            "gemini" | "google" => {
                let base = config
                    .api_base
                    .clone()
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
                Ok(Self::Gemini(llm::remote::GeminiClient::new(RemoteLlmConfig::new(require_api_key()?, base, config.model.clone()))))
            }
            other => Err(LlmClientError(format!(
                "unsupported llm provider '{other}'. available: ollama, llama_cpp, lmstudio, openai, claude, deepseek, grok, openrouter, gemini"
            ))),
        }
    }

    async fn chat_request(&self, request: ChatRequest) -> llm::Result<llm::ChatResponse> {
        match self {
            Self::Ollama(c) => c.chat(request).await,
            Self::LlamaCpp(c) => c.chat(request).await,
            Self::LmStudio(c) => c.chat(request).await,
            Self::OpenAi(c) => c.chat(request).await,
            Self::Claude(c) => c.chat(request).await,
            Self::Deepseek(c) => c.chat(request).await,
            Self::Grok(c) => c.chat(request).await,
            Self::OpenRouter(c) => c.chat(request).await,
            Self::Gemini(c) => c.chat(request).await,
        }
    }
}

#[async_trait]
impl LlmClient for LlmProvider {
    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmClientError> {
        let response = self.chat_request(ChatRequest::new(messages)).await?;
        Ok(response.message.text().unwrap_or_default().to_string())
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError> {
        self.chat(vec![Message::human(prompt)]).await
    }
}

/// Decorates any `LlmClient` with telemetry hooks, tagging every call
/// with the stage that issued it. `Orchestrator` constructs one of these per
/// stage and hands it to `PlanDesigner`/`StepImplementer`/`SummaryComposer`
/// in place of the raw collaborator.
pub struct TelemetryLlmClient<'a> {
    inner: &'a dyn LlmClient,
    telemetry: &'a TelemetryRecorder,
    request_id: String,
    stage: String,
}

impl<'a> TelemetryLlmClient<'a> {
    pub fn new(inner: &'a dyn LlmClient, telemetry: &'a TelemetryRecorder, request_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self { inner, telemetry, request_id: request_id.into(), stage: stage.into() }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl<'a> LlmClient for TelemetryLlmClient<'a> {
    async fn chat(&self, messages: Vec<Message>) -> Result<String, LlmClientError> {
        self.telemetry.record(&LlmCallEvent::started(&self.request_id, &self.stage, Self::now()));
        let started_at = Instant::now();
        match self.inner.chat(messages).await {
            Ok(text) => {
                self.telemetry.record(&LlmCallEvent::completed(
                    &self.request_id,
                    &self.stage,
                    started_at.elapsed().as_millis() as u64,
                    None,
                    None,
                    Self::now(),
                ));
                Ok(text)
            }
            Err(err) => {
                self.telemetry.record(&LlmCallEvent::failed(
                    &self.request_id,
                    &self.stage,
                    started_at.elapsed().as_millis() as u64,
                    err.to_string(),
                    Self::now(),
                ));
                Err(err)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError> {
        self.chat(vec![Message::human(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_rejects_unknown_provider() {
        let config = LlmConfig { provider: "not-a-provider".into(), ..LlmConfig::default() };
        let err = LlmProvider::from_config(&config).unwrap_err();
        assert!(err.0.contains("unsupported llm provider"));
    }

    #[test]
    fn from_config_requires_api_key_for_remote_providers() {
        let config = LlmConfig { provider: "openai".into(), api_key: None, ..LlmConfig::default() };
        let err = LlmProvider::from_config(&config).unwrap_err();
        assert!(err.0.contains("api_key"));
    }

    #[test]
    fn from_config_accepts_ollama_without_api_key() {
        let config = LlmConfig { provider: "ollama".into(), ..LlmConfig::default() };
        assert!(LlmProvider::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn telemetry_wrapper_forwards_successful_call() {
        let stub = crate::testing::StubLlmClient::ok(vec!["hello"]);
        let telemetry = TelemetryRecorder::new(true);
        let wrapped = TelemetryLlmClient::new(&stub, &telemetry, "req-1", "plan");
        let text = wrapped.generate("hi").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn telemetry_wrapper_forwards_failure() {
        let stub = crate::testing::StubLlmClient::new(vec![Err("unreachable".to_string())]);
        let telemetry = TelemetryRecorder::new(true);
        let wrapped = TelemetryLlmClient::new(&stub, &telemetry, "req-1", "plan");
        let err = wrapped.generate("hi").await.unwrap_err();
        assert!(err.0.contains("unreachable"));
    }
}
