//! Structured lifecycle events for vetting runs.
//!
//! Each helper emits one `tracing` event with a stable `event` field so log
//! pipelines can filter on it (`run.started`, `stage.finished`, ...).

use tracing::{info, warn};
use uuid::Uuid;

use crate::stage::StageKind;

/// Span wrapping a whole run; stage and action events inherit its `run_id`.
pub fn run_span(run_id: &Uuid, speaker: &str) -> tracing::Span {
    tracing::info_span!("vetting.run", run_id = %run_id, speaker = %speaker)
}

pub fn emit_run_started(run_id: &Uuid, speaker: &str, stages: usize) {
    info!(event = "run.started", run_id = %run_id, speaker = %speaker, stages = stages);
}

pub fn emit_stage_started(run_id: &Uuid, stage: StageKind) {
    info!(event = "stage.started", run_id = %run_id, stage = %stage);
}

pub fn emit_stage_finished(run_id: &Uuid, stage: StageKind, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_stage_failed(run_id: &Uuid, stage: StageKind, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", run_id = %run_id, stage = %stage, error = %error);
}

pub fn emit_action_recorded(run_id: &Uuid, stage: StageKind, kind: &str, tool: &str, seq: u64) {
    tracing::debug!(
        event = "action.recorded",
        run_id = %run_id,
        stage = %stage,
        kind = %kind,
        tool = %tool,
        seq = seq,
    );
}

pub fn emit_guard_evaluated(run_id: &Uuid, passed: bool, violations: usize) {
    info!(
        event = "guard.evaluated",
        run_id = %run_id,
        passed = passed,
        violations = violations,
    );
}

pub fn emit_run_finished(run_id: &Uuid, state: &str, duration_ms: u64, actions: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        state = %state,
        duration_ms = duration_ms,
        actions = actions,
    );
}
