//! Per-run log of tool actions.
//!
//! Every tool invocation produces a `ToolCalled` event followed by either
//! `ToolReturned` or `ToolFailed`, paired by `call_id`. The delivery guard
//! reads this log; it is the only evidence of real-world side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::stage::StageKind;

/// Classification of an action event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    ToolCalled { tool_name: String },
    ToolReturned { tool_name: String },
    ToolFailed { tool_name: String },
}

impl ActionKind {
    pub fn tool_name(&self) -> &str {
        match self {
            ActionKind::ToolCalled { tool_name }
            | ActionKind::ToolReturned { tool_name }
            | ActionKind::ToolFailed { tool_name } => tool_name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::ToolCalled { .. } => "tool_called",
            ActionKind::ToolReturned { .. } => "tool_returned",
            ActionKind::ToolFailed { .. } => "tool_failed",
        }
    }
}

/// A single entry of a run's action trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEvent {
    /// Monotonically increasing within the run, starting at 1.
    pub seq: u64,
    pub stage: StageKind,
    pub call_id: String,
    pub kind: ActionKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only action log owned by a single run.
#[derive(Debug)]
pub struct ActionLog {
    run_id: Uuid,
    events: Vec<ActionEvent>,
}

impl ActionLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            events: Vec::new(),
        }
    }

    /// Append an event and return its sequence number.
    pub fn record(
        &mut self,
        stage: StageKind,
        call_id: &str,
        kind: ActionKind,
        payload: Value,
    ) -> u64 {
        let seq = self.events.len() as u64 + 1;
        crate::obs::emit_action_recorded(&self.run_id, stage, kind.label(), kind.tool_name(), seq);
        self.events.push(ActionEvent {
            seq,
            stage,
            call_id: call_id.to_string(),
            kind,
            payload,
            timestamp: Utc::now(),
        });
        seq
    }

    pub fn events(&self) -> &[ActionEvent] {
        &self.events
    }

    pub fn for_stage(&self, stage: StageKind) -> impl Iterator<Item = &ActionEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ActionEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_assigns_sequence() {
        let mut log = ActionLog::new(Uuid::new_v4());
        let first = log.record(
            StageKind::Research,
            "call-1",
            ActionKind::ToolCalled {
                tool_name: "web_search".to_string(),
            },
            json!({"input": {"query": "Jane Doe"}}),
        );
        let second = log.record(
            StageKind::Research,
            "call-1",
            ActionKind::ToolReturned {
                tool_name: "web_search".to_string(),
            },
            json!({"output": {"results": []}}),
        );
        assert_eq!((first, second), (1, 2));
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_stage(StageKind::Deliver).count(), 0);
    }

    #[test]
    fn test_action_kind_serde_tag() {
        let kind = ActionKind::ToolFailed {
            tool_name: "send_message".to_string(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "tool_failed");
        assert_eq!(value["tool_name"], "send_message");
        assert_eq!(kind.label(), "tool_failed");
    }
}
