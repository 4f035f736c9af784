//! Sequential pipeline orchestration.
//!
//! A [`Pipeline`] is an ordered, validated list of stages. Each run gets a
//! fresh [`RunContext`], walks the stages in order, and finishes with the
//! delivery guard deciding whether the messenger's attempt actually landed.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::action::ActionEvent;
use crate::capability::{GenerationCapability, MessagingCapability, SearchCapability};
use crate::config::CrewConfig;
use crate::context::RunContext;
use crate::domain::{
    DeliveryAttempt, DeliveryReceipt, FailureKind, PipelineError, Result, SealedScoreCard,
    SpeakerProfile,
};
use crate::guard::DeliveryGuard;
use crate::metrics::METRICS;
use crate::obs;
use crate::stage::{PayloadKind, Stage, StageKind, StagePayload};
use crate::stages::{Evaluator, Messenger, Researcher};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Pending,
    Researched,
    Evaluated,
    Delivered,
    DeliveryFailed,
    Aborted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Pending => "PENDING",
            PipelineState::Researched => "RESEARCHED",
            PipelineState::Evaluated => "EVALUATED",
            PipelineState::Delivered => "DELIVERED",
            PipelineState::DeliveryFailed => "DELIVERY_FAILED",
            PipelineState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Delivered | PipelineState::DeliveryFailed | PipelineState::Aborted
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run did not reach `Delivered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// `None` when the input was rejected before any stage ran, or the run's
    /// task did not complete.
    pub stage: Option<StageKind>,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    fn new(stage: Option<StageKind>, error: &PipelineError) -> Self {
        Self {
            stage,
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }
}

/// Timing of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub duration_ms: u64,
    pub success: bool,
}

/// Outcome of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub profile: SpeakerProfile,
    pub state: PipelineState,
    /// Every state the run passed through, starting with `Pending`.
    pub transitions: Vec<PipelineState>,
    pub stages: Vec<StageRecord>,
    /// Present once the evaluator succeeded, even if delivery later failed.
    pub scorecard: Option<SealedScoreCard>,
    pub receipt: Option<DeliveryReceipt>,
    pub failure: Option<StageFailure>,
    pub actions: Vec<ActionEvent>,
    pub config_digest: Option<String>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn delivered(&self) -> bool {
        self.state == PipelineState::Delivered
    }
}

/// Builder that checks stage compatibility before producing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    config_digest: Option<String>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn config_digest(mut self, digest: impl Into<String>) -> Self {
        self.config_digest = Some(digest.into());
        self
    }

    /// Validate the stage chain.
    ///
    /// The first stage must accept a profile, the last must produce a
    /// delivery attempt, each stage must accept what its predecessor
    /// produces, and no stage kind may appear twice.
    pub fn build(self) -> Result<Pipeline> {
        let (Some(first), Some(last)) = (self.stages.first(), self.stages.last()) else {
            return Err(PipelineError::InvalidPipeline(
                "pipeline has no stages".to_string(),
            ));
        };
        if first.accepts() != PayloadKind::Profile {
            return Err(PipelineError::InvalidPipeline(format!(
                "first stage {} must accept Profile, accepts {:?}",
                first.kind(),
                first.accepts()
            )));
        }
        if last.produces() != PayloadKind::DeliveryAttempt {
            return Err(PipelineError::InvalidPipeline(format!(
                "last stage {} must produce DeliveryAttempt, produces {:?}",
                last.kind(),
                last.produces()
            )));
        }
        for pair in self.stages.windows(2) {
            if pair[0].produces() != pair[1].accepts() {
                return Err(PipelineError::InvalidPipeline(format!(
                    "stage {} produces {:?} but stage {} accepts {:?}",
                    pair[0].kind(),
                    pair[0].produces(),
                    pair[1].kind(),
                    pair[1].accepts()
                )));
            }
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if self.stages[..i].iter().any(|s| s.kind() == stage.kind()) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "duplicate stage {}",
                    stage.kind()
                )));
            }
        }

        Ok(Pipeline {
            stages: self.stages,
            config_digest: self.config_digest,
        })
    }
}

/// External services injected into the standard stages.
#[derive(Clone)]
pub struct Capabilities {
    pub search: Arc<dyn SearchCapability>,
    pub generation: Arc<dyn GenerationCapability>,
    pub messaging: Arc<dyn MessagingCapability>,
}

/// Immutable, shareable research → evaluate → deliver pipeline.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    config_digest: Option<String>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_kinds())
            .field("config_digest", &self.config_digest)
            .finish()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The standard three-stage crew.
    pub fn from_config(config: CrewConfig, capabilities: Capabilities) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::InvalidPipeline(e.to_string()))?;
        let digest = config.digest();
        let config = Arc::new(config);

        Self::builder()
            .stage(Researcher::new(
                Arc::clone(&config),
                Arc::clone(&capabilities.generation),
                capabilities.search,
            )?)
            .stage(Evaluator::new(
                Arc::clone(&config),
                Arc::clone(&capabilities.generation),
            ))
            .stage(Messenger::new(
                config,
                capabilities.generation,
                capabilities.messaging,
            )?)
            .config_digest(digest)
            .build()
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Run one profile through every stage. Never panics on stage failure;
    /// the outcome is always described by the returned result.
    pub async fn run(&self, profile: SpeakerProfile) -> PipelineResult {
        let ctx = RunContext::new(profile);
        let span = obs::run_span(&ctx.run_id(), &ctx.profile().name);
        self.execute(ctx).instrument(span).await
    }

    /// Run independent profiles concurrently, at most `max_concurrent` at once.
    ///
    /// Returns one result per profile, in input order. Each run is isolated in
    /// its own context; a run whose task panics comes back `Aborted`.
    pub async fn run_many(
        self: Arc<Self>,
        profiles: Vec<SpeakerProfile>,
        max_concurrent: usize,
    ) -> Vec<PipelineResult> {
        let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let tasks = profiles.iter().cloned().map(|profile| {
            let pipeline = Arc::clone(&self);
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                pipeline.run(profile).await
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .zip(profiles)
            .map(|(joined, profile)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(speaker = %profile.name, error = %e, "pipeline run task did not complete");
                    METRICS.inc_runs_failed();
                    self.interrupted(profile, &e)
                }
            })
            .collect()
    }

    /// Result standing in for a run whose task never returned one.
    fn interrupted(&self, profile: SpeakerProfile, error: &JoinError) -> PipelineResult {
        let error = PipelineError::RunInterrupted(error.to_string());
        PipelineResult {
            run_id: Uuid::new_v4(),
            profile,
            state: PipelineState::Aborted,
            transitions: vec![PipelineState::Pending, PipelineState::Aborted],
            stages: Vec::new(),
            scorecard: None,
            receipt: None,
            failure: Some(StageFailure::new(None, &error)),
            actions: Vec::new(),
            config_digest: self.config_digest.clone(),
            duration_ms: 0,
        }
    }

    async fn execute(&self, mut ctx: RunContext) -> PipelineResult {
        let start = Instant::now();
        let run_id = ctx.run_id();
        METRICS.inc_runs_started();
        obs::emit_run_started(&run_id, &ctx.profile().name, self.stages.len());

        let mut state = PipelineState::Pending;
        let mut transitions = vec![state];
        let mut records = Vec::new();
        let mut scorecard = None;
        let mut receipt = None;
        let mut failure = None;

        let mut payload = match ctx.profile().validate() {
            Ok(()) => Some(StagePayload::Profile(ctx.profile().clone())),
            Err(e) => {
                failure = Some(StageFailure::new(None, &e));
                state = PipelineState::Aborted;
                transitions.push(state);
                None
            }
        };

        for stage in &self.stages {
            let Some(input) = payload.take() else {
                break;
            };
            let kind = stage.kind();
            obs::emit_stage_started(&run_id, kind);
            let stage_start = Instant::now();

            let outcome = stage.run(input, &mut ctx).await;
            let duration_ms = stage_start.elapsed().as_millis() as u64;
            records.push(StageRecord {
                stage: kind,
                duration_ms,
                success: outcome.is_ok(),
            });
            obs::emit_stage_finished(&run_id, kind, duration_ms, outcome.is_ok());

            match outcome {
                Ok(next) => {
                    match &next {
                        StagePayload::Brief(_) => state = PipelineState::Researched,
                        StagePayload::ScoreCard(sealed) => {
                            scorecard = Some(sealed.clone());
                            state = PipelineState::Evaluated;
                        }
                        StagePayload::Profile(_) | StagePayload::DeliveryAttempt(_) => {}
                    }
                    if transitions.last() != Some(&state) {
                        transitions.push(state);
                    }
                    payload = Some(next);
                }
                Err(e) => {
                    obs::emit_stage_failed(&run_id, kind, &e);
                    failure = Some(StageFailure::new(Some(kind), &e));
                    state = if stage.produces() == PayloadKind::DeliveryAttempt {
                        PipelineState::DeliveryFailed
                    } else {
                        PipelineState::Aborted
                    };
                    transitions.push(state);
                    break;
                }
            }
        }

        if let Some(StagePayload::DeliveryAttempt(attempt)) = payload.take() {
            match self.confirm_delivery(&ctx, &attempt) {
                Ok(confirmed) => {
                    receipt = Some(confirmed);
                    state = PipelineState::Delivered;
                }
                Err(e) => {
                    failure = Some(StageFailure::new(Some(StageKind::Deliver), &e));
                    state = PipelineState::DeliveryFailed;
                }
            }
            transitions.push(state);
        }

        if state == PipelineState::Delivered {
            METRICS.inc_runs_delivered();
        } else {
            METRICS.inc_runs_failed();
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id, state.as_str(), duration_ms, ctx.actions().len());

        let profile = ctx.profile().clone();
        PipelineResult {
            run_id,
            profile,
            state,
            transitions,
            stages: records,
            scorecard,
            receipt,
            failure,
            actions: ctx.into_actions().into_events(),
            config_digest: self.config_digest.clone(),
            duration_ms,
        }
    }

    fn confirm_delivery(
        &self,
        ctx: &RunContext,
        attempt: &DeliveryAttempt,
    ) -> Result<DeliveryReceipt> {
        let verdict = DeliveryGuard::evaluate(ctx.actions().events(), attempt);
        obs::emit_guard_evaluated(&ctx.run_id(), verdict.passed, verdict.violations.len());
        match verdict.receipt {
            Some(receipt) if verdict.passed => Ok(receipt),
            _ => {
                METRICS.inc_guard_rejections();
                Err(PipelineError::DeliveryNotConfirmed {
                    violations: verdict.violations,
                })
            }
        }
    }
}
