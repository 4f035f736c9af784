//! Capability interfaces for the external services a run depends on.
//!
//! Stages only see these traits. Production wiring injects HTTP adapters;
//! tests inject the deterministic doubles in [`crate::fakes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stage::StageKind;
use crate::tooling::ToolSpec;

/// Failure reported by an external capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Transport failure, timeout, 5xx or rate limiting.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The service answered but refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The service answered with something we could not decode.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A ranked search hit with source attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub url: String,
    pub text: String,
}

/// Web search: query string in, ranked snippets out.
#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<SearchSnippet>, CapabilityError>;
}

/// A messaging user resolved by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
}

/// Acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    pub channel: String,
    pub message_id: String,
}

/// Messaging: recipient lookup and message delivery.
///
/// Both operations are side-effecting external calls; their outcomes are
/// recorded in the run's action log where the delivery guard inspects them.
#[async_trait]
pub trait MessagingCapability: Send + Sync {
    async fn find_user_by_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Recipient>, CapabilityError>;

    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<MessageAck, CapabilityError>;
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of an agent transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User { content: String },
    Assistant { content: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
    ToolResult { call_id: String, content: String },
}

/// Everything the generation backend needs for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Stage the requesting agent belongs to.
    pub stage: StageKind,
    pub model: String,
    pub temperature: f64,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    /// JSON Schema the final answer must follow, if any.
    pub output_schema: Option<Value>,
}

/// A completion: either a final answer or a batch of tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationReply {
    Text { content: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
}

impl GenerationReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_call(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCalls {
            calls: vec![ToolCallRequest {
                call_id: call_id.into(),
                name: name.into(),
                arguments,
            }],
        }
    }
}

/// LLM generation with optional tool calling and structured output.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError>;
}
