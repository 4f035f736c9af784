//! Agent tools bound to capabilities.
//!
//! Provides:
//! - `ToolSpec`: name, description and JSON parameter schema shown to the model
//! - `Tool`: async contract for invoking a capability on the model's behalf
//! - `Toolset`: per-agent registry (an agent sees only its own tools)
//! - the three concrete tools: `web_search`, `find_user_by_name`, `send_message`

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::capability::{CapabilityError, MessagingCapability, SearchCapability};
use crate::domain::{PipelineError, Result};

pub const WEB_SEARCH: &str = "web_search";
pub const FIND_USER_BY_NAME: &str = "find_user_by_name";
pub const SEND_MESSAGE: &str = "send_message";

/// Tool description presented to the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// Build a spec whose arguments are all required strings.
    pub fn with_string_args(
        name: &str,
        description: &str,
        args: &[(&str, &str)],
    ) -> Self {
        let mut properties = serde_json::Map::new();
        for (arg, arg_description) in args {
            properties.insert(
                (*arg).to_string(),
                json!({"type": "string", "description": arg_description}),
            );
        }
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "required": args.iter().map(|(arg, _)| *arg).collect::<Vec<_>>(),
                "properties": properties,
            }),
        }
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// How an agent reacts when a tool's capability fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the error to the model and keep going.
    Degrade,
    /// An `Unavailable` capability fails the stage.
    Abort,
}

/// A callable tool exposed to an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Capability label used in `ToolUnavailable` errors.
    fn capability(&self) -> &'static str;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Degrade
    }

    async fn call(&self, input: &Value) -> std::result::Result<Value, CapabilityError>;
}

/// Ordered per-agent tool registry.
#[derive(Clone, Default)]
pub struct Toolset {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolset {
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.get(&tool.spec().name).is_some() {
            return Err(PipelineError::InvalidPipeline(format!(
                "duplicate tool registration: {}",
                tool.spec().name
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| &t.spec().name))
            .finish()
    }
}

/// Check the model's arguments against the tool's required fields.
pub fn validate_input(spec: &ToolSpec, input: &Value) -> std::result::Result<(), String> {
    if !input.is_object() {
        return Err(format!("arguments for '{}' must be a JSON object", spec.name));
    }
    for field in spec.required_fields() {
        match input.get(field) {
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(format!("field '{field}' must not be empty"));
            }
            Some(Value::Null) | None => {
                return Err(format!("missing required field '{field}'"));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn str_arg<'a>(input: &'a Value, field: &str) -> std::result::Result<&'a str, CapabilityError> {
    input[field]
        .as_str()
        .ok_or_else(|| CapabilityError::Rejected(format!("argument '{field}' must be a string")))
}

/// `web_search` backed by a [`SearchCapability`].
pub struct WebSearchTool {
    spec: ToolSpec,
    search: Arc<dyn SearchCapability>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn SearchCapability>, max_results: usize) -> Self {
        Self {
            spec: ToolSpec::with_string_args(
                WEB_SEARCH,
                "Search the web and return ranked snippets with their source URLs.",
                &[("query", "Search query")],
            ),
            search,
            max_results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn capability(&self) -> &'static str {
        "search"
    }

    async fn call(&self, input: &Value) -> std::result::Result<Value, CapabilityError> {
        let query = str_arg(input, "query")?;
        let results = self.search.search(query, self.max_results).await?;
        Ok(json!({ "results": results }))
    }
}

/// `find_user_by_name` backed by a [`MessagingCapability`].
pub struct FindUserTool {
    spec: ToolSpec,
    messaging: Arc<dyn MessagingCapability>,
}

impl FindUserTool {
    pub fn new(messaging: Arc<dyn MessagingCapability>) -> Self {
        Self {
            spec: ToolSpec::with_string_args(
                FIND_USER_BY_NAME,
                "Look up a messaging user by display name and return their user id.",
                &[("name", "Display name of the user")],
            ),
            messaging,
        }
    }
}

#[async_trait]
impl Tool for FindUserTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn capability(&self) -> &'static str {
        "messaging"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    async fn call(&self, input: &Value) -> std::result::Result<Value, CapabilityError> {
        let name = str_arg(input, "name")?;
        Ok(match self.messaging.find_user_by_name(name).await? {
            Some(recipient) => json!({
                "found": true,
                "user_id": recipient.id,
                "display_name": recipient.display_name,
            }),
            None => json!({ "found": false, "display_name": name }),
        })
    }
}

/// `send_message` backed by a [`MessagingCapability`].
pub struct SendMessageTool {
    spec: ToolSpec,
    messaging: Arc<dyn MessagingCapability>,
}

impl SendMessageTool {
    pub fn new(messaging: Arc<dyn MessagingCapability>) -> Self {
        Self {
            spec: ToolSpec::with_string_args(
                SEND_MESSAGE,
                "Send a direct message to a user id returned by find_user_by_name.",
                &[
                    ("recipient_id", "User id of the recipient"),
                    ("text", "Message body"),
                ],
            ),
            messaging,
        }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn capability(&self) -> &'static str {
        "messaging"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    async fn call(&self, input: &Value) -> std::result::Result<Value, CapabilityError> {
        let recipient_id = str_arg(input, "recipient_id")?;
        let text = str_arg(input, "text")?;
        let ack = self.messaging.send_message(recipient_id, text).await?;
        Ok(json!({
            "ok": true,
            "recipient_id": recipient_id,
            "channel": ack.channel,
            "message_id": ack.message_id,
        }))
    }
}
