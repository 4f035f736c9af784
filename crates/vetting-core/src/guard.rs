//! Delivery guard: decides from the action log whether a report was sent.
//!
//! The messenger's own answer is never trusted. A run counts as delivered only
//! when the recorded deliver-stage actions show a completed `send_message` to
//! a user id that `find_user_by_name` resolved for the configured recipient,
//! carrying the report's scorecard digest line.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionEvent, ActionKind};
use crate::domain::{DeliveryAttempt, DeliveryReceipt};
use crate::stage::StageKind;
use crate::tooling::{FIND_USER_BY_NAME, SEND_MESSAGE};

/// Guard evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub passed: bool,

    /// Reasons delivery could not be confirmed (empty if passed).
    pub violations: Vec<String>,

    pub message: String,

    /// Present if and only if `passed`.
    pub receipt: Option<DeliveryReceipt>,
}

/// Post-condition check run by the pipeline after the messenger stage.
pub struct DeliveryGuard;

impl DeliveryGuard {
    /// Evaluate the run's action events against a delivery attempt.
    ///
    /// Rules, over deliver-stage events only:
    /// - at least one `send_message` must have been called
    /// - one of them must have returned `ok` for a recipient id resolved by
    ///   `find_user_by_name` for `attempt.recipient_name`, with text carrying
    ///   the attempt's scorecard digest line
    /// - no `send_message` call may be left without a matching completion
    pub fn evaluate(events: &[ActionEvent], attempt: &DeliveryAttempt) -> GuardVerdict {
        let deliver: Vec<&ActionEvent> = events
            .iter()
            .filter(|e| e.stage == StageKind::Deliver)
            .collect();

        let resolved = resolved_recipients(&deliver, &attempt.recipient_name);

        let mut violations = Vec::new();
        let mut sends_called = BTreeSet::new();
        let mut sends_completed = BTreeSet::new();
        let mut confirmed: Option<DeliveryReceipt> = None;

        for event in &deliver {
            if event.kind.tool_name() != SEND_MESSAGE {
                continue;
            }
            match &event.kind {
                ActionKind::ToolCalled { .. } => {
                    sends_called.insert(event.call_id.as_str());
                }
                ActionKind::ToolFailed { .. } => {
                    sends_completed.insert(event.call_id.as_str());
                    let error = event.payload["error"].as_str().unwrap_or("unknown error");
                    violations.push(format!(
                        "send_message call '{}' failed: {}",
                        event.call_id, error
                    ));
                }
                ActionKind::ToolReturned { .. } => {
                    sends_completed.insert(event.call_id.as_str());
                    match check_send(event, &resolved, attempt) {
                        Ok(receipt) => {
                            if confirmed.is_none() {
                                confirmed = Some(receipt);
                            }
                        }
                        Err(violation) => violations.push(violation),
                    }
                }
            }
        }

        if sends_called.is_empty() {
            violations.push("no send_message action was recorded".to_string());
        }

        let pending: Vec<&str> = sends_called.difference(&sends_completed).copied().collect();
        for call_id in &pending {
            violations.push(format!(
                "send_message call '{call_id}' was called but never completed"
            ));
        }

        if confirmed.is_none() && !sends_called.is_empty() && pending.is_empty() {
            violations.push(format!(
                "no send_message to recipient '{}' was confirmed",
                attempt.recipient_name
            ));
        }

        match confirmed {
            Some(receipt) if pending.is_empty() => GuardVerdict {
                passed: true,
                message: format!(
                    "delivery to '{}' confirmed (message {})",
                    receipt.recipient_name, receipt.message_id
                ),
                violations: Vec::new(),
                receipt: Some(receipt),
            },
            _ => GuardVerdict {
                passed: false,
                message: format!("delivery not confirmed: {} violation(s)", violations.len()),
                violations,
                receipt: None,
            },
        }
    }
}

/// User ids that `find_user_by_name` returned for the expected recipient.
fn resolved_recipients(events: &[&ActionEvent], recipient_name: &str) -> HashMap<String, String> {
    let mut resolved = HashMap::new();
    for event in events {
        if !matches!(&event.kind, ActionKind::ToolReturned { tool_name } if tool_name == FIND_USER_BY_NAME)
        {
            continue;
        }
        let output = &event.payload["output"];
        if output["found"].as_bool() != Some(true) {
            continue;
        }
        let queried = event.payload["input"]["name"].as_str().unwrap_or_default();
        let display = output["display_name"].as_str().unwrap_or_default();
        let matches_recipient = queried.trim().eq_ignore_ascii_case(recipient_name.trim())
            || display.trim().eq_ignore_ascii_case(recipient_name.trim());
        if let (true, Some(user_id)) = (matches_recipient, output["user_id"].as_str()) {
            resolved.insert(user_id.to_string(), display.to_string());
        }
    }
    resolved
}

fn check_send(
    event: &ActionEvent,
    resolved: &HashMap<String, String>,
    attempt: &DeliveryAttempt,
) -> Result<DeliveryReceipt, String> {
    let output = &event.payload["output"];
    if output["ok"].as_bool() != Some(true) {
        return Err(format!(
            "send_message call '{}' was not acknowledged",
            event.call_id
        ));
    }

    let recipient_id = output["recipient_id"]
        .as_str()
        .or_else(|| event.payload["input"]["recipient_id"].as_str())
        .unwrap_or_default();
    if !resolved.contains_key(recipient_id) {
        return Err(format!(
            "send_message call '{}' targeted '{}', which was not resolved for recipient '{}'",
            event.call_id, recipient_id, attempt.recipient_name
        ));
    }

    let text = event.payload["input"]["text"].as_str().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(format!(
            "send_message call '{}' sent an empty message",
            event.call_id
        ));
    }
    if !text.contains(&attempt.digest_line()) {
        return Err(format!(
            "send_message call '{}' did not carry the report for scorecard {}",
            event.call_id, attempt.scorecard_digest
        ));
    }

    Ok(DeliveryReceipt {
        recipient_name: attempt.recipient_name.clone(),
        recipient_id: recipient_id.to_string(),
        channel: str_field(output, "channel"),
        message_id: str_field(output, "message_id"),
        scorecard_digest: attempt.scorecard_digest.clone(),
        confirmed_at: event.timestamp,
    })
}

fn str_field(value: &Value, field: &str) -> String {
    value[field].as_str().unwrap_or_default().to_string()
}
