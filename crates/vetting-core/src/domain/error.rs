//! Error taxonomy for the vetting pipeline.

use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

/// Errors produced by pipeline stages, the scorecard validator and the delivery guard.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{capability} capability unavailable: {detail}")]
    ToolUnavailable { capability: String, detail: String },

    #[error("scorecard schema violation at '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("delivery not confirmed: {}", .violations.join("; "))]
    DeliveryNotConfirmed { violations: Vec<String> },

    #[error("stage {stage} exceeded its iteration budget of {limit}")]
    IterationBudgetExceeded { stage: StageKind, limit: u32 },

    #[error("stage {stage} exceeded its execution time limit of {limit_secs}s")]
    ExecutionTimeExceeded { stage: StageKind, limit_secs: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("run did not complete: {0}")]
    RunInterrupted(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Coarse classification used in run results and logs.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            Self::SchemaViolation { .. } => FailureKind::SchemaViolation,
            Self::DeliveryNotConfirmed { .. } => FailureKind::DeliveryNotConfirmed,
            Self::IterationBudgetExceeded { .. } => FailureKind::IterationBudgetExceeded,
            Self::ExecutionTimeExceeded { .. } => FailureKind::ExecutionTimeExceeded,
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::DigestMismatch { .. } => FailureKind::DigestMismatch,
            Self::InvalidPipeline(_) | Self::RunInterrupted(_) | Self::Serialization(_) => {
                FailureKind::Internal
            }
        }
    }
}

/// Serializable label for a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolUnavailable,
    SchemaViolation,
    DeliveryNotConfirmed,
    IterationBudgetExceeded,
    ExecutionTimeExceeded,
    InvalidInput,
    DigestMismatch,
    Internal,
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_not_confirmed_lists_violations() {
        let err = PipelineError::DeliveryNotConfirmed {
            violations: vec![
                "no send_message action was recorded".to_string(),
                "recipient 'alice' was never resolved".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("no send_message action"));
        assert!(msg.contains("never resolved"));
        assert_eq!(err.failure_kind(), FailureKind::DeliveryNotConfirmed);
    }

    #[test]
    fn test_iteration_budget_display() {
        let err = PipelineError::IterationBudgetExceeded {
            stage: StageKind::Research,
            limit: 25,
        };
        assert_eq!(
            err.to_string(),
            "stage research exceeded its iteration budget of 25"
        );
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::SchemaViolation).unwrap();
        assert_eq!(json, "\"schema_violation\"");
    }
}
