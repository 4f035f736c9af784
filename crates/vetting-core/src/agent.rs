//! Bounded tool-calling agent loop.
//!
//! An [`Agent`] alternates between the generation capability and its own
//! [`Toolset`] until the model produces a final text answer. Every tool
//! invocation is written to the run's action log before and after it runs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::action::ActionKind;
use crate::capability::{
    CapabilityError, ChatMessage, GenerationCapability, GenerationReply, GenerationRequest,
    ToolCallRequest,
};
use crate::config::{interpolate, AgentConfig};
use crate::context::RunContext;
use crate::domain::{PipelineError, Result};
use crate::metrics::METRICS;
use crate::stage::StageKind;
use crate::tooling::{validate_input, FailurePolicy, Toolset};

/// The work item handed to an agent.
#[derive(Debug, Clone, Default)]
pub struct AgentTask {
    pub description: String,
    pub expected_output: String,
    /// Output of the previous stage, if any.
    pub context: Option<String>,
    /// Structured-output contract for the final answer.
    pub output_schema: Option<Value>,
}

impl AgentTask {
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// The user message sent to the model.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n\nExpected output: {}",
            self.description, self.expected_output
        );
        if let Some(context) = &self.context {
            out.push_str("\n\nContext:\n");
            out.push_str(context);
        }
        out
    }
}

/// A role-playing LLM agent restricted to its own tools.
#[derive(Clone)]
pub struct Agent {
    stage: StageKind,
    config: AgentConfig,
    generation: Arc<dyn GenerationCapability>,
    tools: Toolset,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("stage", &self.stage)
            .field("role", &self.config.role)
            .field("model", &self.config.model)
            .field("tools", &self.tools)
            .finish()
    }
}

impl Agent {
    pub fn new(
        stage: StageKind,
        config: AgentConfig,
        generation: Arc<dyn GenerationCapability>,
    ) -> Self {
        Self {
            stage,
            config,
            generation,
            tools: Toolset::default(),
        }
    }

    pub fn with_tools(mut self, tools: Toolset) -> Self {
        self.tools = tools;
        self
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &Toolset {
        &self.tools
    }

    pub fn system_prompt(&self, vars: &[(&str, String)]) -> String {
        let mut prompt = format!(
            "You are {}.\n{}\n\nYour personal goal is: {}",
            interpolate(&self.config.role, vars),
            interpolate(&self.config.backstory, vars),
            interpolate(&self.config.goal, vars),
        );
        if self.config.inject_date {
            prompt.push_str(&format!(
                "\n\nCurrent date: {}",
                chrono::Utc::now().format("%Y-%m-%d")
            ));
        }
        prompt
    }

    /// Run `task` to completion and return the final answer text.
    ///
    /// Bounded by `max_iter` generation rounds and, when configured,
    /// `max_execution_secs` of wall-clock time.
    #[instrument(skip_all, fields(stage = %self.stage, run_id = %ctx.run_id()))]
    pub async fn execute(
        &self,
        task: &AgentTask,
        vars: &[(&str, String)],
        ctx: &mut RunContext,
    ) -> Result<String> {
        match self.config.max_execution_secs {
            Some(limit_secs) => {
                tokio::time::timeout(
                    Duration::from_secs(limit_secs),
                    self.run_loop(task, vars, ctx),
                )
                .await
                .map_err(|_| PipelineError::ExecutionTimeExceeded {
                    stage: self.stage,
                    limit_secs,
                })?
            }
            None => self.run_loop(task, vars, ctx).await,
        }
    }

    async fn run_loop(
        &self,
        task: &AgentTask,
        vars: &[(&str, String)],
        ctx: &mut RunContext,
    ) -> Result<String> {
        let system = self.system_prompt(vars);
        let mut messages = vec![ChatMessage::User {
            content: task.render(),
        }];

        for iteration in 1..=self.config.max_iter {
            let request = GenerationRequest {
                stage: self.stage,
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                system: system.clone(),
                messages: messages.clone(),
                tools: self.tools.specs(),
                output_schema: task.output_schema.clone(),
            };

            let reply = self.generation.generate(&request).await.map_err(|e| {
                PipelineError::ToolUnavailable {
                    capability: "generation".to_string(),
                    detail: e.to_string(),
                }
            })?;

            match reply {
                GenerationReply::Text { content } => {
                    debug!(iteration, "agent produced final answer");
                    return Ok(content);
                }
                GenerationReply::ToolCalls { calls } => {
                    debug!(iteration, calls = calls.len(), "agent requested tools");
                    messages.push(ChatMessage::ToolCalls {
                        calls: calls.clone(),
                    });
                    for call in &calls {
                        let content = self.invoke_tool(call, ctx).await?;
                        messages.push(ChatMessage::ToolResult {
                            call_id: call.call_id.clone(),
                            content,
                        });
                    }
                }
            }
        }

        Err(PipelineError::IterationBudgetExceeded {
            stage: self.stage,
            limit: self.config.max_iter,
        })
    }

    /// Invoke one tool, recording the call and its outcome.
    ///
    /// Returns the text fed back to the model. Errors the model can react to
    /// (unknown tool, bad arguments, degraded capability) come back as JSON
    /// `{"error": ...}`; only an unavailable `Abort` capability fails the stage.
    async fn invoke_tool(&self, call: &ToolCallRequest, ctx: &mut RunContext) -> Result<String> {
        METRICS.inc_tool_calls();
        let actions = ctx.actions_mut();
        actions.record(
            self.stage,
            &call.call_id,
            ActionKind::ToolCalled {
                tool_name: call.name.clone(),
            },
            json!({ "input": call.arguments }),
        );

        let failed = |error: &str| {
            (
                ActionKind::ToolFailed {
                    tool_name: call.name.clone(),
                },
                json!({ "input": call.arguments, "error": error }),
            )
        };

        let Some(tool) = self.tools.get(&call.name) else {
            let error = format!("unknown tool '{}'", call.name);
            let (kind, payload) = failed(&error);
            actions.record(self.stage, &call.call_id, kind, payload);
            return Ok(json!({ "error": error }).to_string());
        };

        if let Err(error) = validate_input(tool.spec(), &call.arguments) {
            let (kind, payload) = failed(&error);
            actions.record(self.stage, &call.call_id, kind, payload);
            return Ok(json!({ "error": error }).to_string());
        }

        match tool.call(&call.arguments).await {
            Ok(output) => {
                let text = output.to_string();
                ctx.actions_mut().record(
                    self.stage,
                    &call.call_id,
                    ActionKind::ToolReturned {
                        tool_name: call.name.clone(),
                    },
                    json!({ "input": call.arguments, "output": output }),
                );
                Ok(text)
            }
            Err(err) => {
                let error = err.to_string();
                let (kind, payload) = failed(&error);
                ctx.actions_mut()
                    .record(self.stage, &call.call_id, kind, payload);
                warn!(tool = %call.name, error = %error, "tool call failed");

                if tool.failure_policy() == FailurePolicy::Abort
                    && matches!(err, CapabilityError::Unavailable(_))
                {
                    return Err(PipelineError::ToolUnavailable {
                        capability: tool.capability().to_string(),
                        detail: error,
                    });
                }
                Ok(json!({ "error": error }).to_string())
            }
        }
    }
}
