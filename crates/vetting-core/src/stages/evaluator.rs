use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::agent::Agent;
use crate::capability::GenerationCapability;
use crate::config::CrewConfig;
use crate::context::RunContext;
use crate::domain::{QualificationScoreCard, Result, SealedScoreCard};
use crate::stage::{PayloadKind, Stage, StageKind, StagePayload};

use super::{render_task, unexpected_payload};

/// Scores the research brief on four dimensions.
///
/// The generated answer is validated locally with
/// [`QualificationScoreCard::from_json_str`]; an invalid scorecard fails the
/// stage and is never retried.
pub struct Evaluator {
    config: Arc<CrewConfig>,
    agent: Agent,
}

impl Evaluator {
    pub fn new(config: Arc<CrewConfig>, generation: Arc<dyn GenerationCapability>) -> Self {
        let agent = Agent::new(
            StageKind::Evaluate,
            config.agents.evaluator.clone(),
            generation,
        );
        Self { config, agent }
    }
}

#[async_trait]
impl Stage for Evaluator {
    fn kind(&self) -> StageKind {
        StageKind::Evaluate
    }

    fn accepts(&self) -> PayloadKind {
        PayloadKind::Brief
    }

    fn produces(&self) -> PayloadKind {
        PayloadKind::ScoreCard
    }

    async fn run(&self, input: StagePayload, ctx: &mut RunContext) -> Result<StagePayload> {
        let brief = match input {
            StagePayload::Brief(brief) => brief,
            other => return Err(unexpected_payload(self.kind(), self.accepts(), &other)),
        };

        let vars = self.config.template_vars(ctx.profile());
        let task = render_task(&self.config.tasks.evaluate, &vars)
            .with_context(brief.as_context())
            .with_output_schema(QualificationScoreCard::json_schema());
        let answer = self.agent.execute(&task, &vars, ctx).await?;

        let scorecard = QualificationScoreCard::from_json_str(&answer)?;
        let sealed = SealedScoreCard::seal(scorecard)?;
        info!(
            speaker = %ctx.profile().name,
            total = sealed.scorecard().total(),
            digest = %sealed.digest(),
            "scorecard validated"
        );
        Ok(StagePayload::ScoreCard(sealed))
    }
}
