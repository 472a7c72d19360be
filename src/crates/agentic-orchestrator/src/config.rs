//! Layered configuration, grounded on the dual-location
//! `OrcaConfig`/`ConfigLoader` pattern this codebase already uses: defaults,
//! then a user-level TOML file, then a project-level one, each overriding
//! the last, with `${VAR_NAME}` environment expansion for secret-shaped
//! fields. The core itself never touches the filesystem — loading is a
//! concern of the embedding binary, which then builds a `RuntimeContext`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration recognized by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub snippet: SnippetConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_attempts() -> u8 {
    3
}
fn default_request_timeout_ms() -> u64 {
    300_000
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_progress_enabled")]
    pub enabled: bool,
    #[serde(default = "default_progress_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_progress_min_delta")]
    pub min_delta: u64,
}

fn default_progress_enabled() -> bool {
    true
}
fn default_progress_min_interval_ms() -> u64 {
    300
}
fn default_progress_min_delta() -> u64 {
    1
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_progress_enabled(),
            min_interval_ms: default_progress_min_interval_ms(),
            min_delta: default_progress_min_delta(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

fn default_max_bytes() -> usize {
    262_144
}
fn default_namespace() -> String {
    "core.request.snippets".to_string()
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            default_namespace: default_namespace(),
        }
    }
}

/// LLM provider selection and advisory sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-sonnet".to_string(),
            api_key: None,
            api_base: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl OrchestratorConfig {
    /// `other` takes precedence field-by-field; used to layer project config
    /// over user config over defaults.
    pub fn merge(&mut self, other: OrchestratorConfig) {
        self.orchestration = other.orchestration;
        self.progress = other.progress;
        self.snippet = other.snippet;
        self.llm = other.llm;
    }

    /// Expand `${VAR_NAME}` in secret-shaped fields. Only the LLM API key
    /// and base URL carry secrets or environment-specific values.
    pub fn resolve_env_vars(&mut self) {
        if let Some(key) = &self.llm.api_key {
            self.llm.api_key = Some(expand_env_var(key));
        }
        if let Some(base) = &self.llm.api_base {
            self.llm.api_base = Some(expand_env_var(base));
        }
    }
}

fn expand_env_var(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

/// Loads configuration from defaults, then `~/.agentic-orchestrator/config.toml`,
/// then `./.agentic-orchestrator/config.toml`, each overriding the previous.
pub struct ConfigLoader {
    user_config_path: PathBuf,
    project_config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: Self::user_config_path(),
            project_config_path: Self::project_config_path(),
        }
    }

    fn user_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentic-orchestrator")
            .join("config.toml")
    }

    fn project_config_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".agentic-orchestrator")
            .join("config.toml")
    }

    pub async fn load(&self) -> Result<OrchestratorConfig, String> {
        let mut config = OrchestratorConfig::default();

        if let Some(user_config) = self.try_load(&self.user_config_path).await? {
            config.merge(user_config);
        }
        if let Some(project_config) = self.try_load(&self.project_config_path).await? {
            config.merge(project_config);
        }

        config.resolve_env_vars();
        Ok(config)
    }

    async fn try_load(&self, path: &PathBuf) -> Result<Option<OrchestratorConfig>, String> {
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
        let parsed: OrchestratorConfig =
            toml::from_str(&content).map_err(|e| format!("failed to parse config '{}': {e}", path.display()))?;
        Ok(Some(parsed))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6_4() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.orchestration.max_attempts, 3);
        assert_eq!(config.orchestration.request_timeout_ms, 300_000);
        assert!(config.progress.enabled);
        assert_eq!(config.progress.min_interval_ms, 300);
        assert_eq!(config.progress.min_delta, 1);
        assert_eq!(config.snippet.max_bytes, 262_144);
        assert_eq!(config.snippet.default_namespace, "core.request.snippets");
    }

    #[test]
    fn merge_replaces_every_section() {
        let mut base = OrchestratorConfig::default();
        let mut override_config = OrchestratorConfig::default();
        override_config.orchestration.max_attempts = 7;
        override_config.llm.model = "claude-3-opus".to_string();

        base.merge(override_config);

        assert_eq!(base.orchestration.max_attempts, 7);
        assert_eq!(base.llm.model, "claude-3-opus");
    }

    #[test]
    fn env_var_expansion_only_touches_braced_values() {
        std::env::set_var("ORCH_TEST_KEY", "secret-123");
        let mut config = OrchestratorConfig::default();
        config.llm.api_key = Some("${ORCH_TEST_KEY}".to_string());
        config.resolve_env_vars();
        assert_eq!(config.llm.api_key, Some("secret-123".to_string()));
        std::env::remove_var("ORCH_TEST_KEY");
    }

    #[test]
    fn literal_value_is_left_untouched() {
        let mut config = OrchestratorConfig::default();
        config.llm.api_key = Some("sk-literal".to_string());
        config.resolve_env_vars();
        assert_eq!(config.llm.api_key, Some("sk-literal".to_string()));
    }

    #[tokio::test]
    async fn loader_returns_defaults_when_no_files_present() {
        let loader = ConfigLoader::new();
        let config = loader.load().await.unwrap();
        assert_eq!(config.orchestration.max_attempts, 3);
    }

    #[test]
    fn toml_parses_partial_sections_with_defaults() {
        let toml_src = r#"
            [orchestration]
            max_attempts = 5
        "#;
        let config: OrchestratorConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.orchestration.max_attempts, 5);
        assert_eq!(config.orchestration.request_timeout_ms, 300_000);
        assert!(config.progress.enabled);
    }
}
