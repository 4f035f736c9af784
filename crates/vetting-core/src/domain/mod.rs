//! Domain types for a vetting run.
//!
//! - [`profile`]: `SpeakerProfile` (pipeline input)
//! - [`brief`]: `ResearchBrief` (researcher output)
//! - [`scorecard`]: `QualificationScoreCard` and its validator (evaluator output)
//! - [`receipt`]: `DeliveryAttempt` (messenger output), `DeliveryReceipt` (guard output)
//! - [`error`]: `PipelineError`, `FailureKind`

pub mod brief;
pub mod error;
pub mod profile;
pub mod receipt;
pub mod scorecard;

pub use brief::{ResearchBrief, SourceRef};
pub use error::{FailureKind, PipelineError, Result};
pub use profile::SpeakerProfile;
pub use receipt::{digest_line, DeliveryAttempt, DeliveryReceipt};
pub use scorecard::{
    Dimension, DimensionScore, QualificationScoreCard, SealedScoreCard, SCORE_MAX, SCORE_MIN,
};
