//! Messenger stage output and delivery evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the messenger stage hands back: a report it tried to deliver.
///
/// An attempt is not evidence of delivery. The pipeline only turns it into a
/// [`DeliveryReceipt`] after the delivery guard has inspected the recorded
/// `send_message` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Display name the report had to be sent to.
    pub recipient_name: String,
    /// Rendered report the agent was asked to send.
    pub report: String,
    /// Digest of the scorecard the report was rendered from.
    pub scorecard_digest: String,
    /// Final free-text answer from the messenger agent.
    pub agent_summary: String,
}

impl DeliveryAttempt {
    /// The line a sent message must carry to count as this report.
    pub fn digest_line(&self) -> String {
        digest_line(&self.scorecard_digest)
    }
}

/// Closing line of a rendered report, binding it to its sealed scorecard.
pub fn digest_line(scorecard_digest: &str) -> String {
    format!("Scorecard digest: {scorecard_digest}")
}

/// Evidence that the report reached the resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub recipient_name: String,
    pub recipient_id: String,
    pub channel: String,
    pub message_id: String,
    pub scorecard_digest: String,
    pub confirmed_at: DateTime<Utc>,
}
