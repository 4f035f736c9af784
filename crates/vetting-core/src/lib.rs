//! Speaker Vetting Core Library
//!
//! A sequential research → evaluate → deliver pipeline for vetting
//! conference speakers. External services (search, LLM generation,
//! messaging) are injected as capability traits.

pub mod action;
pub mod agent;
pub mod capability;
pub mod config;
pub mod context;
pub mod domain;
pub mod fakes;
pub mod guard;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod telemetry;
pub mod tooling;

pub use action::{ActionEvent, ActionKind, ActionLog};
pub use agent::{Agent, AgentTask};
pub use capability::{
    CapabilityError, ChatMessage, GenerationCapability, GenerationReply, GenerationRequest,
    MessageAck, MessagingCapability, Recipient, SearchCapability, SearchSnippet, ToolCallRequest,
};
pub use config::{AgentConfig, ConfigError, CrewConfig, TaskConfig};
pub use context::RunContext;
pub use domain::{
    DeliveryAttempt, DeliveryReceipt, Dimension, DimensionScore, FailureKind, PipelineError,
    QualificationScoreCard, ResearchBrief, Result, SealedScoreCard, SourceRef, SpeakerProfile,
    SCORE_MAX, SCORE_MIN,
};
pub use guard::{DeliveryGuard, GuardVerdict};
pub use metrics::METRICS;
pub use pipeline::{
    Capabilities, Pipeline, PipelineBuilder, PipelineResult, PipelineState, StageFailure,
    StageRecord,
};
pub use stage::{PayloadKind, Stage, StageKind, StagePayload};
pub use stages::{render_report, Evaluator, Messenger, Researcher};
pub use telemetry::init_tracing;
pub use tooling::{FailurePolicy, Tool, ToolSpec, Toolset};
