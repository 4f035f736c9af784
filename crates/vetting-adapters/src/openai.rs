//! OpenAI chat completions as a [`GenerationCapability`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use vetting_core::{
    CapabilityError, ChatMessage, GenerationCapability, GenerationReply, GenerationRequest,
    ToolCallRequest,
};

use crate::{http_client, require_env, send_for_text};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client. The model comes from each request, not the client.
#[derive(Clone)]
pub struct OpenAiGeneration {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiGeneration {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http_client()?,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env() -> Result<Self> {
        let client = Self::new(require_env("OPENAI_API_KEY")?)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url),
            _ => client,
        })
    }
}

impl std::fmt::Debug for OpenAiGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGeneration")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Validation keywords that strict structured output has rejected. The limits
/// are still checked locally when the reply is parsed.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
];

/// Copy of `schema` without [`UNSUPPORTED_KEYWORDS`], at any depth.
pub fn strict_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_KEYWORDS.contains(&key.as_str()))
                .map(|(key, value)| {
                    // Keys under `properties` are field names, not keywords.
                    let value = if key == "properties" {
                        match value {
                            Value::Object(fields) => Value::Object(
                                fields
                                    .iter()
                                    .map(|(name, field)| (name.clone(), strict_schema(field)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        }
                    } else {
                        strict_schema(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strict_schema).collect()),
        other => other.clone(),
    }
}

/// Build the `/chat/completions` request body.
pub fn build_chat_body(request: &GenerationRequest) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": request.system })];
    messages.extend(request.messages.iter().map(|message| match message {
        ChatMessage::User { content } => json!({ "role": "user", "content": content }),
        ChatMessage::Assistant { content } => json!({ "role": "assistant", "content": content }),
        ChatMessage::ToolCalls { calls } => json!({
            "role": "assistant",
            "content": null,
            "tool_calls": calls.iter().map(|call| json!({
                "id": call.call_id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                },
            })).collect::<Vec<_>>(),
        }),
        ChatMessage::ToolResult { call_id, content } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }));

    let mut body = json!({
        "model": request.model,
        "temperature": request.temperature,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();
    }

    if let Some(schema) = &request.output_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": format!("{}_output", request.stage),
                "strict": true,
                "schema": strict_schema(schema),
            },
        });
    }

    body
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    // OpenAI returns arguments as a JSON string
    arguments: String,
}

#[derive(Deserialize)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

/// Parse a `/chat/completions` response body.
pub fn parse_chat_response(body: &str) -> Result<GenerationReply, CapabilityError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Malformed(format!("OpenAI response: {e}")))?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| CapabilityError::Malformed("OpenAI returned no choices".to_string()))?;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments: Value = serde_json::from_str(&call.function.arguments)
                    .map_err(|e| {
                        CapabilityError::Malformed(format!(
                            "arguments for '{}' are not JSON: {e}",
                            call.function.name
                        ))
                    })?;
                Ok(ToolCallRequest {
                    call_id: call.id,
                    name: call.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>, CapabilityError>>()?;
        return Ok(GenerationReply::ToolCalls { calls });
    }

    if let Some(refusal) = message.refusal {
        return Err(CapabilityError::Rejected(format!("model refused: {refusal}")));
    }

    message
        .content
        .map(GenerationReply::text)
        .ok_or_else(|| CapabilityError::Malformed("OpenAI message has no content".to_string()))
}

#[async_trait]
impl GenerationCapability for OpenAiGeneration {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        let body = build_chat_body(request);
        tracing::debug!(
            stage = %request.stage,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "openai chat completion"
        );
        let text = send_for_text(
            "openai",
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;
        parse_chat_response(&text)
    }
}
