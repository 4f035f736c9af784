//! Stage definitions: the uniform interface every pipeline step implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::domain::{DeliveryAttempt, ResearchBrief, Result, SealedScoreCard, SpeakerProfile};

/// The three stages of a vetting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Research the speaker with web search.
    Research,

    /// Score the research brief.
    Evaluate,

    /// Send the report.
    Deliver,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Evaluate => "evaluate",
            StageKind::Deliver => "deliver",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of the data crossing a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Profile,
    Brief,
    ScoreCard,
    DeliveryAttempt,
}

/// Data handed from one stage to the next. Each stage consumes its input.
#[derive(Debug, Clone)]
pub enum StagePayload {
    Profile(SpeakerProfile),
    Brief(ResearchBrief),
    ScoreCard(SealedScoreCard),
    DeliveryAttempt(DeliveryAttempt),
}

impl StagePayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            StagePayload::Profile(_) => PayloadKind::Profile,
            StagePayload::Brief(_) => PayloadKind::Brief,
            StagePayload::ScoreCard(_) => PayloadKind::ScoreCard,
            StagePayload::DeliveryAttempt(_) => PayloadKind::DeliveryAttempt,
        }
    }
}

/// One unit of the sequential pipeline.
///
/// `accepts`/`produces` are checked by the pipeline builder so that each
/// stage receives exactly what its predecessor emits.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn accepts(&self) -> PayloadKind;

    fn produces(&self) -> PayloadKind;

    async fn run(&self, input: StagePayload, ctx: &mut RunContext) -> Result<StagePayload>;
}
