use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::agent::Agent;
use crate::capability::{GenerationCapability, MessagingCapability};
use crate::config::CrewConfig;
use crate::context::RunContext;
use crate::domain::{
    digest_line, DeliveryAttempt, Result, SealedScoreCard, SpeakerProfile, SCORE_MAX,
};
use crate::stage::{PayloadKind, Stage, StageKind, StagePayload};
use crate::tooling::{FindUserTool, SendMessageTool, Toolset};

use super::{render_task, unexpected_payload};

/// Sends the rendered report to the configured recipient.
///
/// Produces a [`DeliveryAttempt`] only. Whether the report actually went
/// out is decided afterwards by the delivery guard from the action log.
pub struct Messenger {
    config: Arc<CrewConfig>,
    agent: Agent,
}

impl Messenger {
    pub fn new(
        config: Arc<CrewConfig>,
        generation: Arc<dyn GenerationCapability>,
        messaging: Arc<dyn MessagingCapability>,
    ) -> Result<Self> {
        let mut tools = Toolset::default();
        tools.register(Arc::new(FindUserTool::new(messaging.clone())))?;
        tools.register(Arc::new(SendMessageTool::new(messaging)))?;
        let agent = Agent::new(
            StageKind::Deliver,
            config.agents.messenger.clone(),
            generation,
        )
        .with_tools(tools);
        Ok(Self { config, agent })
    }
}

#[async_trait]
impl Stage for Messenger {
    fn kind(&self) -> StageKind {
        StageKind::Deliver
    }

    fn accepts(&self) -> PayloadKind {
        PayloadKind::ScoreCard
    }

    fn produces(&self) -> PayloadKind {
        PayloadKind::DeliveryAttempt
    }

    async fn run(&self, input: StagePayload, ctx: &mut RunContext) -> Result<StagePayload> {
        let sealed = match input {
            StagePayload::ScoreCard(sealed) => sealed,
            other => return Err(unexpected_payload(self.kind(), self.accepts(), &other)),
        };
        sealed.verify()?;

        let report = render_report(ctx.profile(), &sealed);
        let vars = self.config.template_vars(ctx.profile());
        let task = render_task(&self.config.tasks.deliver, &vars).with_context(report.clone());
        let summary = self.agent.execute(&task, &vars, ctx).await?;

        info!(
            speaker = %ctx.profile().name,
            recipient = %self.config.delivery.recipient,
            "messenger finished"
        );
        Ok(StagePayload::DeliveryAttempt(DeliveryAttempt {
            recipient_name: self.config.delivery.recipient.clone(),
            report,
            scorecard_digest: sealed.digest().to_string(),
            agent_summary: summary,
        }))
    }
}

/// Plain-text report sent to the recipient.
pub fn render_report(profile: &SpeakerProfile, sealed: &SealedScoreCard) -> String {
    let scorecard = sealed.scorecard();
    let mut out = format!("Speaker qualification report: {profile}\n");
    for (dimension, score) in scorecard.iter() {
        out.push_str(&format!(
            "\n{}: {}/{}\n  {}\n",
            dimension.title(),
            score.score(),
            SCORE_MAX,
            score.reasoning()
        ));
    }
    out.push_str(&format!(
        "\nTotal: {}/{}\n{}",
        scorecard.total(),
        SCORE_MAX * 4,
        digest_line(sealed.digest())
    ));
    out
}
