//! Minimal chat/message model shared by every provider in this crate.
//!
//! This used to be re-exported from `langgraph-core`'s graph engine. The
//! providers only ever touched a handful of its types (`Message`,
//! `ChatRequest`/`ChatResponse`, a couple of reasoning helpers), so those
//! types now live here directly and the dependency on the graph engine is
//! gone. The shapes are unchanged from what the providers already expected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who sent a message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
    Custom(String),
}

/// Body of a message. Most providers only ever produce/consume `Text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Image(String),
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool the model is allowed to call, described for the provider's function-calling API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Result of executing a `ToolCall`, fed back to the model as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: MessageContent,
    pub name: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Message {
    fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: MessageContent::Text(text.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    /// Plain-text view of this message's content, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Image(_) => None,
        }
    }
}

/// How a reasoning/thinking model should surface its intermediate reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReasoningMode {
    /// Discard reasoning content; return only the final answer.
    #[default]
    None,
    /// Reasoning content stays inline with the final answer.
    Inline,
    /// Reasoning content is split out into `ChatResponse.reasoning`.
    Separated,
}

impl ReasoningMode {
    pub fn should_capture(&self) -> bool {
        matches!(self, Self::Separated)
    }
}

/// Captured reasoning/thinking trace from a reasoning-capable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningContent {
    pub content: String,
}

impl ReasoningContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Per-request sampling/decoding parameters, advisory for providers that don't support them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub reasoning_mode: ReasoningMode,
}

/// A chat completion request: a conversation plus sampling config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ChatConfig,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_reasoning(mut self, mode: ReasoningMode) -> Self {
        self.config.reasoning_mode = mode;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token accounting for a single completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub reasoning_tokens: Option<usize>,
}

impl UsageMetadata {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens: None,
        }
    }

    pub fn with_reasoning(prompt_tokens: usize, completion_tokens: usize, reasoning_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens: Some(reasoning_tokens),
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens + self.reasoning_tokens.unwrap_or(0)
    }
}

/// Result of a (non-streaming) chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<UsageMetadata>,
    pub reasoning: Option<ReasoningContent>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Placeholder for a streaming completion; no provider in this crate implements
/// streaming yet (each returns `LlmError::Other("not yet implemented")`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamResponse {
    pub chunks: Vec<String>,
}

/// Common trait implemented by every concrete provider in `remote`/`local`.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> crate::error::Result<ChatResponse>;
    async fn stream(&self, request: ChatRequest) -> crate::error::Result<ChatStreamResponse>;
    fn clone_box(&self) -> Box<dyn ChatModel>;
}

impl Clone for Box<dyn ChatModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_roundtrip_text() {
        assert_eq!(Message::human("hi").text(), Some("hi"));
        assert_eq!(Message::system("rules").role, MessageRole::System);
        assert_eq!(Message::assistant("ok").role, MessageRole::Assistant);
    }

    #[test]
    fn reasoning_mode_capture() {
        assert!(ReasoningMode::Separated.should_capture());
        assert!(!ReasoningMode::Inline.should_capture());
        assert!(!ReasoningMode::None.should_capture());
    }

    #[test]
    fn usage_metadata_totals() {
        let usage = UsageMetadata::with_reasoning(10, 20, 5);
        assert_eq!(usage.total_tokens(), 35);
        assert_eq!(UsageMetadata::new(1, 2).total_tokens(), 3);
    }

    #[test]
    fn chat_request_builder() {
        let request = ChatRequest::new(vec![Message::human("hello")])
            .with_temperature(0.2)
            .with_reasoning(ReasoningMode::Separated);
        assert_eq!(request.config.temperature, Some(0.2));
        assert!(request.config.reasoning_mode.should_capture());
    }
}
