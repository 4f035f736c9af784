use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::action::{ActionEvent, ActionKind};
use crate::agent::Agent;
use crate::capability::{GenerationCapability, SearchCapability};
use crate::config::CrewConfig;
use crate::context::RunContext;
use crate::domain::{ResearchBrief, Result, SourceRef};
use crate::stage::{PayloadKind, Stage, StageKind, StagePayload};
use crate::tooling::{Toolset, WebSearchTool, WEB_SEARCH};

use super::{render_task, unexpected_payload};

/// Gathers public information about the speaker via web search.
///
/// Search failures do not fail the stage: the agent is told about them and
/// the resulting brief is marked `degraded`.
pub struct Researcher {
    config: Arc<CrewConfig>,
    agent: Agent,
}

impl Researcher {
    pub fn new(
        config: Arc<CrewConfig>,
        generation: Arc<dyn GenerationCapability>,
        search: Arc<dyn SearchCapability>,
    ) -> Result<Self> {
        let mut tools = Toolset::default();
        tools.register(Arc::new(WebSearchTool::new(
            search,
            config.research.max_results,
        )))?;
        let agent = Agent::new(
            StageKind::Research,
            config.agents.researcher.clone(),
            generation,
        )
        .with_tools(tools);
        Ok(Self { config, agent })
    }
}

#[async_trait]
impl Stage for Researcher {
    fn kind(&self) -> StageKind {
        StageKind::Research
    }

    fn accepts(&self) -> PayloadKind {
        PayloadKind::Profile
    }

    fn produces(&self) -> PayloadKind {
        PayloadKind::Brief
    }

    async fn run(&self, input: StagePayload, ctx: &mut RunContext) -> Result<StagePayload> {
        let profile = match input {
            StagePayload::Profile(profile) => profile,
            other => return Err(unexpected_payload(self.kind(), self.accepts(), &other)),
        };

        let vars = self.config.template_vars(&profile);
        let task = render_task(&self.config.tasks.research, &vars);
        let text = self.agent.execute(&task, &vars, ctx).await?;

        let brief = brief_from_actions(text, ctx.actions().for_stage(StageKind::Research));
        if brief.degraded {
            warn!(speaker = %profile.name, "research brief is degraded");
        }
        info!(
            speaker = %profile.name,
            sources = brief.sources.len(),
            degraded = brief.degraded,
            "research brief ready"
        );
        Ok(StagePayload::Brief(brief))
    }
}

/// Assemble the brief from the agent's answer and the recorded searches.
fn brief_from_actions<'a>(
    text: String,
    events: impl Iterator<Item = &'a ActionEvent>,
) -> ResearchBrief {
    let mut sources: Vec<SourceRef> = Vec::new();
    let mut productive = 0usize;
    let mut impaired = false;

    for event in events.filter(|e| e.kind.tool_name() == WEB_SEARCH) {
        match &event.kind {
            ActionKind::ToolReturned { .. } => {
                let results = event.payload["output"]["results"]
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                if results.is_empty() {
                    impaired = true;
                    continue;
                }
                productive += 1;
                for hit in results {
                    let (Some(title), Some(url)) = (
                        hit.get("title").and_then(Value::as_str),
                        hit.get("url").and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    if !sources.iter().any(|s| s.url == url) {
                        sources.push(SourceRef {
                            title: title.to_string(),
                            url: url.to_string(),
                        });
                    }
                }
            }
            ActionKind::ToolFailed { .. } => impaired = true,
            ActionKind::ToolCalled { .. } => {}
        }
    }

    ResearchBrief {
        text,
        sources,
        degraded: impaired || productive == 0,
    }
}
